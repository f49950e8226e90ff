//! Fehler der Medienverarbeitung
//!
//! Diese Fehler verlassen die Paket-Schleifen nie. Der Rekorder stellt bei
//! einem IO-Fehler die Aufnahme ein, die Schnappschuss-Pipeline ueberspringt
//! das betroffene Bild.

use thiserror::Error;

pub type MedienResult<T> = std::result::Result<T, MedienFehler>;

#[derive(Debug, Error)]
pub enum MedienFehler {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ungueltiger Container: {0}")]
    Container(String),

    #[error("Dekodierung fehlgeschlagen: {0}")]
    Dekodierung(String),

    #[error("Kodierung fehlgeschlagen: {0}")]
    Kodierung(String),
}

impl MedienFehler {
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }
}
