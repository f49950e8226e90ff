//! Gemeinsame Typen fuer Raumfunk
//!
//! Teilnehmer-IDs verwenden das Newtype-Pattern, damit sie zur Compilezeit
//! nicht mit Raumnamen verwechselt werden koennen.

use serde::{Deserialize, Serialize};

/// Vom Client gewaehlte Teilnehmer-ID (eindeutig innerhalb eines Raums)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeilnehmerId(pub String);

impl TeilnehmerId {
    /// Erstellt eine TeilnehmerId aus einem beliebigen String
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt die ID als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeilnehmerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Art eines Media-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedienArt {
    Audio,
    Video,
}

impl std::fmt::Display for MedienArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Verbindungszustand einer Peer-Verbindung, wie ihn der Transport meldet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbindungsZustand {
    Neu,
    Verbindet,
    Verbunden,
    Getrennt,
    Fehlgeschlagen,
    Geschlossen,
}

impl VerbindungsZustand {
    /// Zustaende, die den Abbau der zugehoerigen Ressourcen ausloesen
    pub fn ist_beendet(&self) -> bool {
        matches!(self, Self::Getrennt | Self::Fehlgeschlagen | Self::Geschlossen)
    }
}

// ---------------------------------------------------------------------------
// Codec-Metadaten
// ---------------------------------------------------------------------------

/// Unterstuetzte Codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecTyp {
    Opus,
    Vp8,
    H264,
}

impl CodecTyp {
    /// Ermittelt den Codec aus einem MIME-Typ (z.B. "video/VP8")
    pub fn aus_mime(mime: &str) -> Option<Self> {
        let subtyp = mime.rsplit('/').next()?.to_ascii_lowercase();
        match subtyp.as_str() {
            "opus" => Some(Self::Opus),
            "vp8" => Some(Self::Vp8),
            "h264" => Some(Self::H264),
            _ => None,
        }
    }

    /// Medienart des Codecs
    pub fn medien_art(&self) -> MedienArt {
        match self {
            Self::Opus => MedienArt::Audio,
            Self::Vp8 | Self::H264 => MedienArt::Video,
        }
    }
}

/// Codec-, Taktraten- und Kanal-Metadaten eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecInfo {
    /// Codec
    pub typ: CodecTyp,
    /// RTP-Taktrate in Hz
    pub taktrate: u32,
    /// Anzahl Audiokanaele (0 bei Video)
    pub kanaele: u16,
    /// Ausgehandelter RTP-Payload-Typ
    pub payload_typ: u8,
}

impl CodecInfo {
    /// Opus, 48 kHz, Stereo, PT 111
    pub fn opus() -> Self {
        Self {
            typ: CodecTyp::Opus,
            taktrate: 48_000,
            kanaele: 2,
            payload_typ: 111,
        }
    }

    /// VP8, 90 kHz, PT 96
    pub fn vp8() -> Self {
        Self {
            typ: CodecTyp::Vp8,
            taktrate: 90_000,
            kanaele: 0,
            payload_typ: 96,
        }
    }

    /// H.264, 90 kHz, PT 102
    pub fn h264() -> Self {
        Self {
            typ: CodecTyp::H264,
            taktrate: 90_000,
            kanaele: 0,
            payload_typ: 102,
        }
    }

    /// Medienart des Tracks
    pub fn medien_art(&self) -> MedienArt {
        self.typ.medien_art()
    }
}
