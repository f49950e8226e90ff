//! Fehler beim Dekodieren von RTP-Paketen, Codec-Nutzdaten und Befehlen

use thiserror::Error;

pub type ProtokollResult<T> = std::result::Result<T, ProtokollFehler>;

#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("RTP-Fehler: {0}")]
    Rtp(#[from] webrtc_util::Error),

    #[error("Depacketizer-Fehler: {0}")]
    Depacketizer(#[from] ::rtp::Error),

    #[error("Ungueltiger Befehl: {0}")]
    UngueltigerBefehl(String),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}
