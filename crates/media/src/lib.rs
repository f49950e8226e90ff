//! raumfunk-media – Medienverarbeitung abseits des Live-Pfads
//!
//! Setzt RTP-Pakete zu Samples zusammen, schreibt Aufnahmen als WebM und
//! erzeugt Standbilder aus VP8-Keyframes.

pub mod error;
pub mod recorder;
pub mod sample_builder;
pub mod snapshot;
pub mod webm;
pub mod zugriffseinheit;

pub use error::{MedienFehler, MedienResult};
pub use recorder::{Aufnahme, AufnahmePaket, Rekorder, RekorderKonfig, RekorderStatus};
pub use sample_builder::{Sample, SampleBuilderStatistik, Zusammensetzer};
pub use snapshot::{BildDekoder, Rasterbild, Schnappschuss, SchnappschussKonfig, Vp8Dekoder};
pub use zugriffseinheit::ZugriffseinheitPuffer;
