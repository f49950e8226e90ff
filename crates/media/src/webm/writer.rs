//! WebM-Schreiber mit unbekannter Segment- und Clustergroesse
//!
//! Die Datei wird streamend geschrieben: Header und Spuren zuerst, danach
//! Cluster mit SimpleBlocks. Segment und Cluster tragen die Groesse
//! "unbekannt", damit nie zurueckgesprungen werden muss.

use std::io::Write;
use std::time::Duration;

use raumfunk_core::CodecTyp;

use super::ebml;

/// Matroska-Codec-ID eines Codecs
pub fn codec_id(typ: CodecTyp) -> &'static str {
    match typ {
        CodecTyp::Opus => "A_OPUS",
        CodecTyp::Vp8 => "V_VP8",
        CodecTyp::H264 => "V_MPEG4/ISO/AVC",
    }
}

/// Beschreibung einer Spur im Header
#[derive(Debug, Clone, PartialEq)]
pub enum Spur {
    Audio {
        nummer: u64,
        codec: CodecTyp,
        abtastrate: f64,
        kanaele: u64,
        standard_dauer: Duration,
    },
    Video {
        nummer: u64,
        codec: CodecTyp,
        breite: u32,
        hoehe: u32,
        standard_dauer: Duration,
    },
}

impl Spur {
    pub fn nummer(&self) -> u64 {
        match self {
            Self::Audio { nummer, .. } | Self::Video { nummer, .. } => *nummer,
        }
    }

    fn ist_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }

    fn eintrag_schreiben(&self, buf: &mut Vec<u8>) {
        ebml::master(buf, ebml::TRACK_ENTRY, |e| match self {
            Self::Audio {
                nummer,
                codec,
                abtastrate,
                kanaele,
                standard_dauer,
            } => {
                ebml::uint(e, ebml::TRACK_NUMBER, *nummer);
                ebml::uint(e, ebml::TRACK_UID, *nummer);
                ebml::uint(e, ebml::TRACK_TYPE, 2);
                ebml::string(e, ebml::CODEC_ID, codec_id(*codec));
                ebml::string(e, ebml::NAME, "Audio");
                ebml::uint(e, ebml::DEFAULT_DURATION, standard_dauer.as_nanos() as u64);
                ebml::master(e, ebml::AUDIO, |a| {
                    ebml::float(a, ebml::SAMPLING_FREQUENCY, *abtastrate);
                    ebml::uint(a, ebml::CHANNELS, *kanaele);
                });
            }
            Self::Video {
                nummer,
                codec,
                breite,
                hoehe,
                standard_dauer,
            } => {
                ebml::uint(e, ebml::TRACK_NUMBER, *nummer);
                ebml::uint(e, ebml::TRACK_UID, *nummer);
                ebml::uint(e, ebml::TRACK_TYPE, 1);
                ebml::string(e, ebml::CODEC_ID, codec_id(*codec));
                ebml::string(e, ebml::NAME, "Video");
                ebml::uint(e, ebml::DEFAULT_DURATION, standard_dauer.as_nanos() as u64);
                ebml::master(e, ebml::VIDEO, |v| {
                    ebml::uint(v, ebml::PIXEL_WIDTH, *breite as u64);
                    ebml::uint(v, ebml::PIXEL_HEIGHT, *hoehe as u64);
                });
            }
        });
    }
}

// ---------------------------------------------------------------------------
// WebmSchreiber
// ---------------------------------------------------------------------------

pub struct WebmSchreiber<W: Write> {
    ziel: W,
    video_spuren: Vec<u64>,
    /// Startzeit des offenen Clusters in ms
    cluster_start: Option<u64>,
    bloecke: u64,
}

impl<W: Write> WebmSchreiber<W> {
    /// Schreibt EBML-Header, Segment-Anfang, Info und Spuren
    pub fn neu(mut ziel: W, spuren: &[Spur]) -> std::io::Result<Self> {
        let mut buf = Vec::with_capacity(256);

        ebml::master(&mut buf, ebml::EBML, |h| {
            ebml::uint(h, ebml::EBML_VERSION, 1);
            ebml::uint(h, ebml::EBML_READ_VERSION, 1);
            ebml::uint(h, ebml::EBML_MAX_ID_LENGTH, 4);
            ebml::uint(h, ebml::EBML_MAX_SIZE_LENGTH, 8);
            ebml::string(h, ebml::DOC_TYPE, "webm");
            ebml::uint(h, ebml::DOC_TYPE_VERSION, 4);
            ebml::uint(h, ebml::DOC_TYPE_READ_VERSION, 2);
        });

        ebml::id_schreiben(&mut buf, ebml::SEGMENT);
        buf.extend_from_slice(&ebml::UNBEKANNTE_GROESSE);

        ebml::master(&mut buf, ebml::INFO, |i| {
            ebml::uint(i, ebml::TIMECODE_SCALE, 1_000_000);
            ebml::string(i, ebml::MUXING_APP, "raumfunk");
            ebml::string(i, ebml::WRITING_APP, "raumfunk");
        });

        ebml::master(&mut buf, ebml::TRACKS, |t| {
            for spur in spuren {
                spur.eintrag_schreiben(t);
            }
        });

        ziel.write_all(&buf)?;

        Ok(Self {
            ziel,
            video_spuren: spuren
                .iter()
                .filter(|s| s.ist_video())
                .map(Spur::nummer)
                .collect(),
            cluster_start: None,
            bloecke: 0,
        })
    }

    /// Haengt einen SimpleBlock an
    ///
    /// Ein neuer Cluster beginnt bei jedem Video-Keyframe und wenn die
    /// relative Zeit nicht mehr in 16 Bit passt.
    pub fn block_schreiben(
        &mut self,
        spur: u64,
        zeit: Duration,
        keyframe: bool,
        daten: &[u8],
    ) -> std::io::Result<()> {
        let zeit_ms = zeit.as_millis() as u64;
        let video_keyframe = keyframe && self.video_spuren.contains(&spur);

        let start = match self.cluster_start {
            Some(start)
                if !video_keyframe
                    && (zeit_ms as i64 - start as i64) <= i16::MAX as i64
                    && (zeit_ms as i64 - start as i64) >= i16::MIN as i64 =>
            {
                start
            }
            _ => {
                self.cluster_oeffnen(zeit_ms)?;
                zeit_ms
            }
        };

        let relativ = (zeit_ms as i64 - start as i64) as i16;
        let mut inhalt = Vec::with_capacity(daten.len() + 4);
        ebml::vint_schreiben(&mut inhalt, spur);
        inhalt.extend_from_slice(&relativ.to_be_bytes());
        inhalt.push(if keyframe { 0x80 } else { 0x00 });
        inhalt.extend_from_slice(daten);

        let mut buf = Vec::with_capacity(inhalt.len() + 8);
        ebml::element(&mut buf, ebml::SIMPLE_BLOCK, &inhalt);
        self.ziel.write_all(&buf)?;
        self.bloecke += 1;
        Ok(())
    }

    fn cluster_oeffnen(&mut self, zeit_ms: u64) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(24);
        ebml::id_schreiben(&mut buf, ebml::CLUSTER);
        buf.extend_from_slice(&ebml::UNBEKANNTE_GROESSE);
        ebml::uint(&mut buf, ebml::TIMECODE, zeit_ms);
        self.ziel.write_all(&buf)?;
        self.cluster_start = Some(zeit_ms);
        Ok(())
    }

    /// Anzahl geschriebener Bloecke
    pub fn bloecke(&self) -> u64 {
        self.bloecke
    }

    /// Leert den Puffer und gibt das Ziel zurueck
    pub fn schliessen(mut self) -> std::io::Result<W> {
        self.ziel.flush()?;
        Ok(self.ziel)
    }
}
