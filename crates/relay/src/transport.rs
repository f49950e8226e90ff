//! Schnittstelle zum Transport (Aushandlung, ICE, Verschluesselung)
//!
//! Das Relay kennt den Transport nur ueber diese Traits: Tracks lesen,
//! Pakete schreiben und Zustandswechsel empfangen. Die eigentliche
//! Aushandlung ist Sache der Implementierung.

use std::sync::Arc;

use async_trait::async_trait;
use raumfunk_core::{CodecInfo, MedienArt, VerbindungsZustand};
use raumfunk_protocol::RtpPacket;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportFehler {
    /// Gegenstelle bereits abgebaut; fuer Schreibzugriffe kein Fehler
    #[error("Transport bereits geschlossen")]
    Geschlossen,

    #[error("IO-Fehler: {0}")]
    Io(String),

    #[error("Aushandlung fehlgeschlagen: {0}")]
    Aushandlung(String),
}

impl TransportFehler {
    pub fn ist_geschlossen(&self) -> bool {
        matches!(self, Self::Geschlossen)
    }
}

impl From<std::io::Error> for TransportFehler {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Schreibseite eines Tracks
#[async_trait]
pub trait PaketSink: Send + Sync {
    async fn schreiben(&self, paket: &RtpPacket) -> Result<(), TransportFehler>;
}

/// Leseseite eines eingehenden Tracks
#[async_trait]
pub trait TrackLeser: Send + Sync {
    /// Codec, Taktrate und Kanaele laut Aushandlung
    fn codec(&self) -> CodecInfo;

    /// Liest das naechste Paket; `true` markiert ein Kontrollpaket
    async fn lesen(&self) -> Result<(RtpPacket, bool), TransportFehler>;
}

/// Kontrollkanal eines lokalen Tracks, muss leergelesen werden
#[async_trait]
pub trait KontrollLeser: Send + Sync {
    async fn lesen(&self) -> Result<(), TransportFehler>;
}

/// Lokal angelegter, ausgehender Track
pub struct LokalerTrack {
    pub sink: Arc<dyn PaketSink>,
    pub kontrolle: Box<dyn KontrollLeser>,
}

/// Ereignisse einer Peer-Verbindung
pub enum VerbindungsEreignis {
    /// Die Gegenstelle sendet einen neuen Track
    Track(Arc<dyn TrackLeser>),
    Zustand(VerbindungsZustand),
}

#[async_trait]
pub trait PeerVerbindung: Send + Sync {
    /// Legt einen ausgehenden Track an (vor der Aushandlung)
    fn lokalen_track_anlegen(
        &self,
        art: MedienArt,
        codec: CodecInfo,
    ) -> Result<LokalerTrack, TransportFehler>;

    /// Verarbeitet ein Angebot und liefert die Antwort
    async fn aushandeln(&self, angebot: &str) -> Result<String, TransportFehler>;

    /// Ereignisstrom; kann genau einmal abgeholt werden
    fn ereignisse_abholen(&self) -> Option<mpsc::Receiver<VerbindungsEreignis>>;

    async fn schliessen(&self);
}

/// Erzeugt neue Peer-Verbindungen
pub trait TransportFabrik: Send + Sync {
    fn verbindung_erstellen(&self) -> Result<Arc<dyn PeerVerbindung>, TransportFehler>;
}
