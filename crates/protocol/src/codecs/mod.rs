//! Codec-Helfer
//!
//! Das Auspacken der RTP-Nutzdaten uebernehmen die Depacketizer des
//! `rtp`-Crates. Hier liegt, was darueber hinaus gebraucht wird:
//! Keyframe-Erkennung auf zusammengesetzten Frames und das Auslesen der
//! Bildgroesse fuer die Aufnahme.

pub mod h264;
pub mod vp8;

pub use ::rtp::codecs::h264::H264Packet;
pub use ::rtp::codecs::opus::OpusPacket;
pub use ::rtp::codecs::vp8::Vp8Packet;
pub use ::rtp::packetizer::Depacketizer;
