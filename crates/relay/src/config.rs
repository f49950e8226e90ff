//! Typisierte Laufzeit-Konfiguration des Relays
//!
//! Wird vom Server aus der TOML-Konfiguration abgeleitet. Tests bauen sie
//! direkt und lassen Aufnahme und Schnappschuesse in der Regel aus.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AufnahmeKonfig {
    pub verzeichnis: PathBuf,
    pub audio_max_late: u16,
    pub video_max_late: u16,
    pub h264_ersatz_aufloesung: (u32, u32),
    /// Kapazitaet des Kanals zum Schreib-Thread (Pakete)
    pub kapazitaet: usize,
}

#[derive(Debug, Clone)]
pub struct SchnappschussEinstellung {
    pub verzeichnis: PathBuf,
    pub max_late: u16,
    pub kapazitaet: usize,
}

/// Ausgehender Audiopfad zum Publisher
#[derive(Debug, Clone)]
pub struct AusgangKonfig {
    /// Payload-Typ, der jedem ausgehenden Paket aufgepraegt wird
    pub payload_typ: u8,
    /// Erste vergebene Sequenznummer (0 wird zu 1)
    pub start_sequenz: u16,
    /// Kapazitaet des Kanals (Pakete)
    pub kapazitaet: usize,
}

impl Default for AusgangKonfig {
    fn default() -> Self {
        Self {
            payload_typ: 111,
            start_sequenz: 1,
            kapazitaet: 256,
        }
    }
}

/// Parameter fuer das Einspielen von Audiodateien
#[derive(Debug, Clone)]
pub struct EinspeiserKonfig {
    /// Transcoder-Programm
    pub programm: String,
    /// Lesepause, nach der die Einspeisung endet
    pub leerlauf_timeout: Duration,
    /// Wartezeit auf das erste Paket nach dem Start des Transcoders
    pub start_timeout: Duration,
    pub payload_typ: u8,
    pub bitrate: String,
    /// Opus-Framedauer in ms
    pub frame_dauer_ms: u32,
}

impl Default for EinspeiserKonfig {
    fn default() -> Self {
        Self {
            programm: "ffmpeg".into(),
            leerlauf_timeout: Duration::from_millis(800),
            start_timeout: Duration::from_secs(5),
            payload_typ: 111,
            bitrate: "64k".into(),
            frame_dauer_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayKonfig {
    /// `None` = keine Aufnahme
    pub aufnahme: Option<AufnahmeKonfig>,
    /// `None` = keine Schnappschuesse
    pub schnappschuss: Option<SchnappschussEinstellung>,
    pub ausgang: AusgangKonfig,
    pub einspeisung: EinspeiserKonfig,
}
