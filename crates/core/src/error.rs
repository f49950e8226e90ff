//! Fehlertypen fuer Raumfunk
//!
//! Nur Setup-Operationen (Raum anlegen, veroeffentlichen, abonnieren,
//! abspielen) liefern diese Fehler synchron an den Aufrufer. Fehler in den
//! Paket-Schleifen werden lokal geloggt und nie hierher propagiert.

use thiserror::Error;

/// Globaler Result-Alias fuer Raumfunk
pub type Result<T> = std::result::Result<T, RaumfunkError>;

/// Setup- und Konfigurationsfehler, die an die Signalisierung gehen
#[derive(Debug, Error)]
pub enum RaumfunkError {
    // --- Raum-Verwaltung ---
    #[error("Raum existiert bereits: {0}")]
    RaumExistiert(String),

    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(String),

    #[error("Ungueltiger Raumname: {0:?}")]
    UngueltigerRaumname(String),

    // --- Teilnehmer ---
    #[error("Publisher in Raum {0} ist noch nicht bereit (kein Video-Track)")]
    PublisherNichtBereit(String),

    #[error("Raum {0} hat bereits einen Publisher")]
    PublisherVorhanden(String),

    #[error("Abonnent {abonnent} ist in Raum {raum} bereits registriert")]
    AbonnentVorhanden { raum: String, abonnent: String },

    // --- Transport ---
    #[error("Transport-Fehler: {0}")]
    Transport(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RaumfunkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Aufrufer es spaeter erneut versuchen kann
    ///
    /// Ein noch nicht bereiter Publisher ist ein voruebergehender Zustand,
    /// alles andere erfordert eine andere Anfrage.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::PublisherNichtBereit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = RaumfunkError::RaumNichtGefunden("r1".into());
        assert_eq!(e.to_string(), "Raum nicht gefunden: r1");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(RaumfunkError::PublisherNichtBereit("r1".into()).ist_wiederholbar());
        assert!(!RaumfunkError::RaumExistiert("r1".into()).ist_wiederholbar());
    }

    #[test]
    fn abonnent_vorhanden_enthaelt_ids() {
        let e = RaumfunkError::AbonnentVorhanden {
            raum: "r1".into(),
            abonnent: "u1".into(),
        };
        assert!(e.to_string().contains("u1"));
        assert!(e.to_string().contains("r1"));
    }
}
