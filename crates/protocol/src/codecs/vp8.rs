//! VP8 (RFC 6386 / RFC 7741)
//!
//! Arbeitet auf dem zusammengesetzten Frame, also ohne
//! Payload-Descriptor. Das erste Byte traegt den Frame-Tag, ein Keyframe
//! beginnt danach mit Startcode, Breite und Hoehe.

/// Startcode im unkomprimierten Keyframe-Header
const STARTCODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// P-Bit im Frame-Tag: 0 = Keyframe
pub fn ist_keyframe(frame: &[u8]) -> bool {
    frame.first().is_some_and(|tag| tag & 0x01 == 0)
}

/// Liest Breite und Hoehe aus dem Header eines VP8-Keyframes
///
/// Interframes und beschaedigte Header liefern `None`.
pub fn aufloesung(frame: &[u8]) -> Option<(u32, u32)> {
    if frame.len() < 10 || !ist_keyframe(frame) || frame[3..6] != STARTCODE {
        return None;
    }
    let breite = u16::from_le_bytes([frame[6], frame[7]]) & 0x3FFF;
    let hoehe = u16::from_le_bytes([frame[8], frame[9]]) & 0x3FFF;
    if breite == 0 || hoehe == 0 {
        return None;
    }
    Some((breite as u32, hoehe as u32))
}
