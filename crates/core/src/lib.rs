//! raumfunk-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Raumfunk-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{RaumfunkError, Result};
pub use types::{CodecInfo, CodecTyp, MedienArt, TeilnehmerId, VerbindungsZustand};
