//! Signalisierungsbefehle
//!
//! Die Signalisierung selbst (HTTP, WebSocket) liegt ausserhalb des Relays.
//! Eingehende Nachrichten werden genau einmal hier an der Grenze dekodiert
//! und validiert, danach arbeitet das Relay nur noch mit [`Befehl`].
//!
//! ## Format
//! - JSON, Befehlsart im Feld `cmd`
//! - Antworten tragen ihre Art im Feld `type`

use chrono::{DateTime, Utc};
use raumfunk_core::RaumfunkError;
use serde::{Deserialize, Serialize};

use crate::error::{ProtokollFehler, ProtokollResult};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Antworten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    RoomExists,
    NoSuchRoom,
    PublisherNotReady,
    PublisherExists,
    SubscriberExists,
    TransportError,
    InternalError,
}

impl From<&RaumfunkError> for ErrorCode {
    fn from(fehler: &RaumfunkError) -> Self {
        match fehler {
            RaumfunkError::RaumExistiert(_) => Self::RoomExists,
            RaumfunkError::RaumNichtGefunden(_) => Self::NoSuchRoom,
            RaumfunkError::UngueltigerRaumname(_) => Self::InvalidRequest,
            RaumfunkError::PublisherNichtBereit(_) => Self::PublisherNotReady,
            RaumfunkError::PublisherVorhanden(_) => Self::PublisherExists,
            RaumfunkError::AbonnentVorhanden { .. } => Self::SubscriberExists,
            RaumfunkError::Transport(_) => Self::TransportError,
            RaumfunkError::Intern(_) => Self::InternalError,
        }
    }
}

// ---------------------------------------------------------------------------
// Befehle
// ---------------------------------------------------------------------------

/// Validierter Befehl an die Konferenz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Befehl {
    /// Raum anlegen und als Publisher veroeffentlichen
    Create { room_name: String, sdp: String },
    /// Raum als Abonnent beitreten
    Join {
        room_name: String,
        user_id: String,
        sdp: String,
    },
    /// Audiodatei in den Raum einspielen
    Play { room_name: String, path: String },
    /// Alle Raeume auflisten
    List,
}

impl Befehl {
    /// Dekodiert und validiert einen Befehl aus JSON
    pub fn aus_json(json: &str) -> ProtokollResult<Self> {
        let befehl: Self = serde_json::from_str(json)?;
        befehl.validieren()?;
        Ok(befehl)
    }

    /// Prueft Pflichtfelder auf nicht-leere Werte
    pub fn validieren(&self) -> ProtokollResult<()> {
        fn pflicht(feld: &str, wert: &str) -> ProtokollResult<()> {
            if wert.trim().is_empty() {
                return Err(ProtokollFehler::UngueltigerBefehl(format!(
                    "Feld '{feld}' darf nicht leer sein"
                )));
            }
            Ok(())
        }

        match self {
            Self::Create { room_name, sdp } => {
                pflicht("room_name", room_name)?;
                pflicht("sdp", sdp)
            }
            Self::Join {
                room_name,
                user_id,
                sdp,
            } => {
                pflicht("room_name", room_name)?;
                pflicht("user_id", user_id)?;
                pflicht("sdp", sdp)
            }
            Self::Play { room_name, path } => {
                pflicht("room_name", room_name)?;
                pflicht("path", path)
            }
            Self::List => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Antworten
// ---------------------------------------------------------------------------

/// Eintrag der Raumliste
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaumInfo {
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Antwort {
    /// SDP-Antwort auf create/join
    Answer { sdp: String },
    Rooms { rooms: Vec<RaumInfo> },
    Ok,
    Error { code: ErrorCode, message: String },
}

impl Antwort {
    /// Baut eine Fehlerantwort aus einem Setup-Fehler
    pub fn fehler(fehler: &RaumfunkError) -> Self {
        Self::Error {
            code: ErrorCode::from(fehler),
            message: fehler.to_string(),
        }
    }

    /// Fehlerantwort fuer einen nicht dekodierbaren Befehl
    pub fn ungueltig(fehler: &ProtokollFehler) -> Self {
        Self::Error {
            code: ErrorCode::InvalidRequest,
            message: fehler.to_string(),
        }
    }

    pub fn ist_fehler(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
