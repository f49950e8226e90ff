//! Sample-Zusammensetzung aus RTP-Paketen
//!
//! Duenne Schicht ueber dem `SampleBuilder` aus `webrtc-media`: der nimmt
//! Pakete in beliebiger Reihenfolge bis `max_late` Positionen hinter der
//! hoechsten Sequenznummer an und gibt vollstaendige Samples in Reihenfolge
//! heraus. Unvollstaendige Samples verschwinden still.
//!
//! Hier kommen Keyframe-Flag und Zaehler dazu. Ein Sample wird erst
//! ausgegeben, wenn das erste Paket des naechsten Samples da ist; seine
//! Dauer ist der Zeitstempel-Abstand zu diesem Nachfolger.

use std::time::Duration;

use bytes::Bytes;
use raumfunk_core::CodecInfo;
use raumfunk_protocol::codecs::{vp8, Depacketizer, OpusPacket, Vp8Packet};
use raumfunk_protocol::RtpPacket;
use webrtc_media::io::sample_builder::SampleBuilder;

/// Ein vollstaendiges, kodiertes Medien-Sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Codec-Bytes (VP8-Frame, Opus-Paket, Annex-B-Zugriffseinheit)
    pub daten: Bytes,
    /// Zeit bis zum naechsten Sample
    pub dauer: Duration,
    pub ist_keyframe: bool,
    /// RTP-Zeitstempel aller Pakete des Samples
    pub rtp_zeitstempel: u32,
}

/// Statistiken der Zusammensetzung (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBuilderStatistik {
    /// Anzahl empfangener Pakete gesamt
    pub empfangen: u64,
    /// Pakete unvollstaendiger oder zu spaeter Samples
    pub verworfen: u64,
    /// Ausgegebene Samples
    pub samples: u64,
}

/// Setzt die Pakete eines Tracks zu Samples zusammen
///
/// Wird pro Track von genau einem Task benutzt.
pub struct Zusammensetzer<D: Depacketizer> {
    builder: SampleBuilder<D>,
    keyframe: fn(&[u8]) -> bool,
    statistik: SampleBuilderStatistik,
}

impl Zusammensetzer<Vp8Packet> {
    pub fn vp8(max_late: u16) -> Self {
        Self::neu(
            max_late,
            CodecInfo::vp8().taktrate,
            Vp8Packet::default(),
            vp8::ist_keyframe,
        )
    }
}

impl Zusammensetzer<OpusPacket> {
    /// Jedes Opus-Paket ist fuer sich dekodierbar
    pub fn opus(max_late: u16) -> Self {
        Self::neu(
            max_late,
            CodecInfo::opus().taktrate,
            OpusPacket::default(),
            |_| true,
        )
    }
}

impl<D: Depacketizer> Zusammensetzer<D> {
    pub fn neu(max_late: u16, taktrate: u32, depacketizer: D, keyframe: fn(&[u8]) -> bool) -> Self {
        Self {
            builder: SampleBuilder::new(max_late.max(1), depacketizer, taktrate.max(1)),
            keyframe,
            statistik: SampleBuilderStatistik::default(),
        }
    }

    pub fn push(&mut self, paket: RtpPacket) {
        self.statistik.empfangen += 1;
        self.builder.push(paket);
    }

    /// Gibt das aelteste vollstaendige Sample heraus, falls vorhanden
    pub fn pop(&mut self) -> Option<Sample> {
        let sample = self.builder.pop()?;
        if sample.prev_dropped_packets > 0 {
            tracing::debug!(
                verworfen = sample.prev_dropped_packets,
                "Unvollstaendige Samples verworfen"
            );
        }
        self.statistik.verworfen += sample.prev_dropped_packets as u64;
        self.statistik.samples += 1;
        Some(Sample {
            ist_keyframe: (self.keyframe)(&sample.data),
            daten: sample.data,
            dauer: sample.duration,
            rtp_zeitstempel: sample.packet_timestamp,
        })
    }

    pub fn statistik(&self) -> &SampleBuilderStatistik {
        &self.statistik
    }
}
