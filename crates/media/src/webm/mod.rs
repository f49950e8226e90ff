//! WebM-Container (Matroska-Teilmenge)
//!
//! Nur was fuer die Aufnahme gebraucht wird: Header, eine Audio- und eine
//! Videospur, Cluster mit SimpleBlocks, Zeitbasis 1 ms.

pub mod ebml;
mod reader;
mod writer;

pub use reader::{aus_bytes, lesen, Block, SpurEintrag, WebmDatei};
pub use writer::{codec_id, Spur, WebmSchreiber};
