//! raumfunk-relay – Media-Relay fuer einen Publisher und viele Abonnenten
//!
//! Verteilt eingehende Pakete des Publishers an alle Abonnenten, speist
//! Aufnahme und Schnappschuesse und fuehrt Mikrofone der Abonnenten sowie
//! eingespielte Dateien auf einem gemeinsamen Ausgangspfad zum Publisher
//! zusammen. Aushandlung und Verschluesselung liegen hinter den Traits in
//! [`transport`].

pub mod ausgang;
pub mod config;
pub mod einspeiser;
pub mod konferenz;
pub mod raum;
pub mod registry;
pub mod router;
pub mod sinks;
pub mod transport;

pub use ausgang::{AusgangsPaket, Quelle, SequenzUmschreiber};
pub use config::{
    AufnahmeKonfig, AusgangKonfig, EinspeiserKonfig, RelayKonfig, SchnappschussEinstellung,
};
pub use einspeiser::DateiEinspeiser;
pub use konferenz::Konferenz;
pub use raum::Raum;
pub use registry::RaumRegistry;
pub use router::{PaketRouter, RouterStatistik};
pub use sinks::SinkRegister;
pub use transport::{
    KontrollLeser, LokalerTrack, PaketSink, PeerVerbindung, TrackLeser, TransportFabrik,
    TransportFehler, VerbindungsEreignis,
};
