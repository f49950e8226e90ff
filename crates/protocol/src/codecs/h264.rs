//! H.264 (RFC 6184 / ITU-T H.264)
//!
//! Das Auspacken von Single-NAL, STAP-A und FU-A nach Annex-B uebernimmt
//! [`H264Packet`](super::H264Packet). Dieses Modul zerlegt den Annex-B-Strom
//! wieder in NAL-Units, erkennt Keyframes und liest Breite und Hoehe aus
//! einem Sequence Parameter Set. Alle Werte im SPS stammen vom Publisher,
//! die Rechnungen sind deshalb durchgehend geprueft.

pub const STARTCODE: [u8; 4] = [0, 0, 0, 1];

pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

fn nal_typ(byte: u8) -> u8 {
    byte & 0x1F
}

fn ist_keyframe_nal(typ: u8) -> bool {
    typ == NAL_IDR || typ == NAL_SPS
}

// ---------------------------------------------------------------------------
// Annex-B / SPS
// ---------------------------------------------------------------------------

/// Zerlegt einen Annex-B-Strom in NAL-Units (ohne Startcodes)
pub fn nal_einheiten(annex_b: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= annex_b.len() {
        if annex_b[i] == 0 && annex_b[i + 1] == 0 && annex_b[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut einheiten = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut ende = match starts.get(n + 1) {
            Some(&naechster) => naechster - 3,
            None => annex_b.len(),
        };
        // Nullen vor dem naechsten Startcode (4-Byte-Variante) abschneiden
        while ende > start && annex_b[ende - 1] == 0 {
            ende -= 1;
        }
        if ende > start {
            einheiten.push(&annex_b[start..ende]);
        }
    }
    einheiten
}

/// Wahr wenn der Annex-B-Strom eine IDR- oder SPS-NAL-Unit enthaelt
pub fn enthaelt_keyframe(annex_b: &[u8]) -> bool {
    nal_einheiten(annex_b)
        .iter()
        .any(|nal| ist_keyframe_nal(nal_typ(nal[0])))
}

/// Entfernt Emulation-Prevention-Bytes (00 00 03 -> 00 00)
fn rbsp(nal: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nal.len());
    let mut nullen = 0;
    for &b in nal {
        if nullen >= 2 && b == 0x03 {
            nullen = 0;
            continue;
        }
        nullen = if b == 0 { nullen + 1 } else { 0 };
        out.push(b);
    }
    out
}

struct BitLeser<'a> {
    daten: &'a [u8],
    pos: usize,
}

impl<'a> BitLeser<'a> {
    fn neu(daten: &'a [u8]) -> Self {
        Self { daten, pos: 0 }
    }

    fn bit(&mut self) -> Option<u32> {
        let byte = *self.daten.get(self.pos / 8)?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Some(bit as u32)
    }

    fn bits(&mut self, n: u32) -> Option<u32> {
        let mut wert = 0;
        for _ in 0..n {
            wert = (wert << 1) | self.bit()?;
        }
        Some(wert)
    }

    /// Exp-Golomb ohne Vorzeichen
    fn ue(&mut self) -> Option<u32> {
        let mut nullen = 0;
        while self.bit()? == 0 {
            nullen += 1;
            if nullen > 31 {
                return None;
            }
        }
        Some((1u32 << nullen) - 1 + self.bits(nullen)?)
    }

    /// Exp-Golomb mit Vorzeichen
    fn se(&mut self) -> Option<i32> {
        let k = self.ue()?;
        let betrag = k.div_ceil(2) as i32;
        Some(if k % 2 == 1 { betrag } else { -betrag })
    }
}

fn scaling_list_ueberspringen(leser: &mut BitLeser<'_>, groesse: usize) -> Option<()> {
    let mut letzter = 8i64;
    let mut naechster = 8i64;
    for _ in 0..groesse {
        if naechster != 0 {
            let delta = leser.se()? as i64;
            naechster = (letzter + delta).rem_euclid(256);
        }
        if naechster != 0 {
            letzter = naechster;
        }
    }
    Some(())
}

/// Liest die Bildgroesse aus einer SPS-NAL-Unit (inklusive NAL-Header)
pub fn sps_aufloesung(sps: &[u8]) -> Option<(u32, u32)> {
    if sps.len() < 4 || nal_typ(sps[0]) != NAL_SPS {
        return None;
    }
    let roh = rbsp(&sps[1..]);
    let mut r = BitLeser::neu(&roh);

    let profil = r.bits(8)?;
    r.bits(16)?; // constraint flags + level
    r.ue()?; // seq_parameter_set_id

    let mut chroma_format = 1;
    if matches!(
        profil,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format = r.ue()?;
        if chroma_format == 3 {
            r.bit()?;
        }
        r.ue()?; // bit_depth_luma
        r.ue()?; // bit_depth_chroma
        r.bit()?;
        if r.bit()? == 1 {
            let listen = if chroma_format == 3 { 12 } else { 8 };
            for i in 0..listen {
                if r.bit()? == 1 {
                    scaling_list_ueberspringen(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    r.ue()?; // log2_max_frame_num
    match r.ue()? {
        0 => {
            r.ue()?;
        }
        1 => {
            r.bit()?;
            r.se()?;
            r.se()?;
            let zyklus = r.ue()?;
            for _ in 0..zyklus {
                r.se()?;
            }
        }
        _ => {}
    }
    r.ue()?; // max_num_ref_frames
    r.bit()?;

    let breite_mbs = r.ue()?.checked_add(1)?;
    let hoehe_einheiten = r.ue()?.checked_add(1)?;
    let nur_frames = r.bit()?;
    if nur_frames == 0 {
        r.bit()?;
    }
    r.bit()?; // direct_8x8_inference

    let (mut links, mut rechts, mut oben, mut unten) = (0u32, 0u32, 0u32, 0u32);
    if r.bit()? == 1 {
        links = r.ue()?;
        rechts = r.ue()?;
        oben = r.ue()?;
        unten = r.ue()?;
    }

    let (sub_breite, sub_hoehe): (u32, u32) = match chroma_format {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let (einheit_x, einheit_y) = if chroma_format == 0 {
        (1, 2 - nur_frames)
    } else {
        (sub_breite, sub_hoehe * (2 - nur_frames))
    };

    let crop_x = links.checked_add(rechts)?.checked_mul(einheit_x)?;
    let crop_y = oben.checked_add(unten)?.checked_mul(einheit_y)?;
    let breite = breite_mbs.checked_mul(16)?.checked_sub(crop_x)?;
    let hoehe = hoehe_einheiten
        .checked_mul(16)?
        .checked_mul(2 - nur_frames)?
        .checked_sub(crop_y)?;
    if breite == 0 || hoehe == 0 {
        return None;
    }
    Some((breite, hoehe))
}

/// Sucht das erste SPS in einem Annex-B-Strom und liest die Bildgroesse
pub fn aufloesung(annex_b: &[u8]) -> Option<(u32, u32)> {
    nal_einheiten(annex_b)
        .into_iter()
        .find(|nal| nal_typ(nal[0]) == NAL_SPS)
        .and_then(sps_aufloesung)
}
