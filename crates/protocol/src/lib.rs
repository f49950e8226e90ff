//! raumfunk-protocol – Paket- und Nachrichtenformate
//!
//! Dieses Crate stellt das RTP-Paketmodell, die Codec-Helfer fuer
//! Depacketizer und Aufloesungserkennung sowie die Signalisierungsbefehle
//! bereit, ueber die Raeume angelegt und abonniert werden.

pub mod codecs;
pub mod error;
pub mod rtp;
pub mod signal;

pub use self::rtp::{paket as rtp_paket, RtpHeader, RtpPacket};
pub use codecs::Depacketizer;
pub use error::{ProtokollFehler, ProtokollResult};
pub use signal::{Antwort, Befehl, ErrorCode, RaumInfo};
