//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::path::PathBuf;
use std::time::Duration;

use raumfunk_relay::{
    AufnahmeKonfig, AusgangKonfig, EinspeiserKonfig, RelayKonfig, SchnappschussEinstellung,
};
use serde::{Deserialize, Serialize};

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const CONFIG_ENV: &str = "RF_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Aufnahme der Publisher-Medien als WebM
    pub aufnahme: AufnahmeEinstellungen,
    /// Standbilder aus VP8-Keyframes
    pub schnappschuss: SchnappschussEinstellungen,
    /// Ausgehender Audiopfad zum Publisher
    pub audio: AudioEinstellungen,
    /// Einspielen von Audiodateien
    pub einspeisung: EinspeisungEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Raumfunk Server".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AufnahmeEinstellungen {
    pub aktiviert: bool,
    pub verzeichnis: PathBuf,
    /// Aufloesung, falls ein H.264-Keyframe kein lesbares SPS traegt
    pub h264_breite: u32,
    pub h264_hoehe: u32,
    /// Verspaetungsfenster in Paketen
    pub audio_max_late: u16,
    pub video_max_late: u16,
    /// Kapazitaet des Kanals zum Schreib-Thread (Pakete)
    pub kapazitaet: usize,
}

impl Default for AufnahmeEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            verzeichnis: PathBuf::from("./record"),
            h264_breite: 1280,
            h264_hoehe: 720,
            audio_max_late: 10,
            video_max_late: 100,
            kapazitaet: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchnappschussEinstellungen {
    pub aktiviert: bool,
    pub verzeichnis: PathBuf,
    pub max_late: u16,
    /// Kapazitaet des Uebergabekanals (Pakete)
    pub kapazitaet: usize,
}

impl Default for SchnappschussEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            verzeichnis: PathBuf::from("./snapshots"),
            max_late: 20,
            kapazitaet: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Payload-Typ der Pakete an den Publisher
    pub payload_typ: u8,
    /// Erste Sequenznummer des Ausgangs
    pub start_sequenz: u16,
    /// Kapazitaet des Ausgangskanals (Pakete)
    pub kanal_kapazitaet: usize,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        let ausgang = AusgangKonfig::default();
        Self {
            payload_typ: ausgang.payload_typ,
            start_sequenz: ausgang.start_sequenz,
            kanal_kapazitaet: ausgang.kapazitaet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EinspeisungEinstellungen {
    /// Transcoder-Programm
    pub programm: String,
    pub leerlauf_timeout_ms: u64,
    /// Wartezeit auf das erste Paket des Transcoders
    pub start_timeout_ms: u64,
    pub payload_typ: u8,
    pub bitrate: String,
    pub frame_dauer_ms: u32,
}

impl Default for EinspeisungEinstellungen {
    fn default() -> Self {
        let e = EinspeiserKonfig::default();
        Self {
            programm: e.programm,
            leerlauf_timeout_ms: e.leerlauf_timeout.as_millis() as u64,
            start_timeout_ms: e.start_timeout.as_millis() as u64,
            payload_typ: e.payload_typ,
            bitrate: e.bitrate,
            frame_dauer_ms: e.frame_dauer_ms,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Laedt die Konfiguration von `$RF_CONFIG` bzw. `config.toml`
    pub fn aus_umgebung() -> anyhow::Result<Self> {
        let pfad = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".into());
        Self::laden(&pfad)
    }

    /// Prueft Werte, die TOML allein nicht ausschliesst
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !crate::logging::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiger Log-Level: {}", self.logging.level);
        }
        if !crate::logging::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: {}", self.logging.format);
        }
        if self.audio.kanal_kapazitaet == 0 {
            anyhow::bail!("audio.kanal_kapazitaet muss groesser 0 sein");
        }
        if self.aufnahme.kapazitaet == 0 {
            anyhow::bail!("aufnahme.kapazitaet muss groesser 0 sein");
        }
        if self.einspeisung.programm.trim().is_empty() {
            anyhow::bail!("einspeisung.programm darf nicht leer sein");
        }
        Ok(())
    }

    /// Uebersetzt in die typisierte Laufzeit-Konfiguration des Relays
    pub fn relay_konfig(&self) -> RelayKonfig {
        let aufnahme = self.aufnahme.aktiviert.then(|| AufnahmeKonfig {
            verzeichnis: self.aufnahme.verzeichnis.clone(),
            audio_max_late: self.aufnahme.audio_max_late,
            video_max_late: self.aufnahme.video_max_late,
            h264_ersatz_aufloesung: (self.aufnahme.h264_breite, self.aufnahme.h264_hoehe),
            kapazitaet: self.aufnahme.kapazitaet,
        });
        let schnappschuss = self
            .schnappschuss
            .aktiviert
            .then(|| SchnappschussEinstellung {
                verzeichnis: self.schnappschuss.verzeichnis.clone(),
                max_late: self.schnappschuss.max_late,
                kapazitaet: self.schnappschuss.kapazitaet,
            });

        RelayKonfig {
            aufnahme,
            schnappschuss,
            ausgang: AusgangKonfig {
                payload_typ: self.audio.payload_typ,
                start_sequenz: self.audio.start_sequenz,
                kapazitaet: self.audio.kanal_kapazitaet,
            },
            einspeisung: EinspeiserKonfig {
                programm: self.einspeisung.programm.clone(),
                leerlauf_timeout: Duration::from_millis(self.einspeisung.leerlauf_timeout_ms),
                start_timeout: Duration::from_millis(self.einspeisung.start_timeout_ms),
                payload_typ: self.einspeisung.payload_typ,
                bitrate: self.einspeisung.bitrate.clone(),
                frame_dauer_ms: self.einspeisung.frame_dauer_ms,
            },
        }
    }
}
