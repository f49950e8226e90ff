//! RTP-Paketmodell (RFC 3550)
//!
//! Paket und Header kommen aus dem `rtp`-Crate. Das Relay arbeitet nur auf
//! dieser Ebene: Pakete werden unveraendert an Abonnenten kopiert, fuer die
//! Aufnahme zu Samples zusammengesetzt und fuer den ausgehenden Audiopfad
//! neu nummeriert. Hier liegen die Helfer zum Bauen, Serialisieren und
//! Vergleichen.

use bytes::Bytes;
use webrtc_util::marshal::{Marshal, Unmarshal};

use crate::error::ProtokollResult;

pub use ::rtp::header::Header as RtpHeader;
pub use ::rtp::packet::Packet as RtpPacket;

/// RTP-Version, die wir sprechen
pub const RTP_VERSION: u8 = 2;

/// Baut ein Paket ohne CSRC und Extension
pub fn paket(
    payload_type: u8,
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    marker: bool,
    payload: impl Into<Bytes>,
) -> RtpPacket {
    RtpPacket {
        header: RtpHeader {
            version: RTP_VERSION,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            ..Default::default()
        },
        payload: payload.into(),
    }
}

/// Serialisiert ein Paket fuer den Versand als Datagramm
pub fn kodieren(paket: &RtpPacket) -> ProtokollResult<Bytes> {
    Ok(paket.marshal()?)
}

/// Dekodiert ein Paket aus einem Datagramm
pub fn dekodieren(datagramm: &[u8]) -> ProtokollResult<RtpPacket> {
    let mut puffer = datagramm;
    Ok(RtpPacket::unmarshal(&mut puffer)?)
}

// ---------------------------------------------------------------------------
// Sequenz- und Zeitstempel-Arithmetik
// ---------------------------------------------------------------------------

/// Wahr wenn `a` in der 16-Bit-Sequenz vor `b` liegt (mit Umlauf)
pub fn seq_vor(a: u16, b: u16) -> bool {
    a != b && b.wrapping_sub(a) < 0x8000
}

/// Abstand von `von` nach `bis` vorwaerts gezaehlt
pub fn seq_abstand(von: u16, bis: u16) -> u16 {
    bis.wrapping_sub(von)
}

/// Wahr wenn der Zeitstempel `a` vor `b` liegt (mit Umlauf)
pub fn zeitstempel_vor(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < 0x8000_0000
}
