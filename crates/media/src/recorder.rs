//! WebM-Rekorder eines Raums
//!
//! Nimmt die RTP-Pakete des Publishers entgegen, setzt sie zu Samples
//! zusammen und schreibt sie in eine WebM-Datei. Pro Aufloesung entsteht
//! eine eigene Datei:
//!
//! ```text
//! {verzeichnis}/{raum}_{sitzungsstart}_{breite}x{hoehe}.webm
//! ```
//!
//! ## Zustaende
//! - `Uninitialisiert`: wartet auf den ersten Video-Keyframe mit bekannter
//!   Groesse, Audio wird bis dahin verworfen
//! - `Offen`: schreibt; ein Keyframe mit anderer Groesse schliesst die Datei
//!   und oeffnet sofort die naechste
//! - `Geschlossen` / `Fehlgeschlagen`: weitere Pakete sind wirkungslos
//!
//! Ein Mutex pro Rekorder serialisiert Audio- und Video-Schreibzugriffe.
//! Die Dateizugriffe laufen nicht im Paketpfad: [`Aufnahme`] reicht die
//! Pakete ueber einen begrenzten Kanal an einen eigenen Schreib-Thread.
//!
//! Die Praesentationszeit einer Spur folgt den RTP-Zeitstempeln der
//! geschriebenen Samples. Ein Zeitstempel, der nicht nach dem vorigen
//! liegt, schiebt die Zeit nicht weiter.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use raumfunk_core::{CodecInfo, CodecTyp};
use raumfunk_protocol::codecs::{h264, vp8, OpusPacket, Vp8Packet};
use raumfunk_protocol::rtp::zeitstempel_vor;
use raumfunk_protocol::RtpPacket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::MedienResult;
use crate::sample_builder::{Sample, Zusammensetzer};
use crate::webm::{Spur, WebmSchreiber};
use crate::zugriffseinheit::ZugriffseinheitPuffer;

pub const AUDIO_SPUR: u64 = 1;
pub const VIDEO_SPUR: u64 = 2;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RekorderKonfig {
    /// Zielverzeichnis (wird bei Bedarf angelegt)
    pub verzeichnis: PathBuf,
    /// Raumname, Praefix der Dateinamen
    pub raum: String,
    /// Ausgehandelter Video-Codec des Publishers
    pub video_codec: CodecTyp,
    /// Verspaetungsfenster Audio (Pakete)
    pub audio_max_late: u16,
    /// Verspaetungsfenster Video (Pakete)
    pub video_max_late: u16,
    /// Annahme, falls ein H.264-Keyframe kein lesbares SPS traegt
    pub h264_ersatz_aufloesung: (u32, u32),
}

impl RekorderKonfig {
    pub fn neu(verzeichnis: impl Into<PathBuf>, raum: impl Into<String>, video_codec: CodecTyp) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
            raum: raum.into(),
            video_codec,
            audio_max_late: 10,
            video_max_late: 100,
            h264_ersatz_aufloesung: (1280, 720),
        }
    }
}

/// Oeffentlich sichtbarer Zustand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekorderStatus {
    Uninitialisiert,
    Offen { breite: u32, hoehe: u32 },
    Geschlossen,
    Fehlgeschlagen,
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

struct OffeneDatei {
    schreiber: WebmSchreiber<BufWriter<File>>,
    pfad: PathBuf,
    aufloesung: (u32, u32),
    /// Zeitachsen-Ursprung dieser Datei je Spur
    video_basis: Duration,
    audio_basis: Option<Duration>,
}

enum Zustand {
    Uninitialisiert,
    Offen(OffeneDatei),
    Geschlossen,
    Fehlgeschlagen,
}

enum VideoEingang {
    Vp8(Zusammensetzer<Vp8Packet>),
    H264(ZugriffseinheitPuffer),
}

/// Praesentationszeit einer Spur aus RTP-Zeitstempeln
struct Zeitachse {
    taktrate: u64,
    pts: Duration,
    letzter: Option<u32>,
}

impl Zeitachse {
    fn neu(taktrate: u32) -> Self {
        Self {
            taktrate: taktrate.max(1) as u64,
            pts: Duration::ZERO,
            letzter: None,
        }
    }

    /// Praesentationszeit eines Samples mit diesem Zeitstempel
    fn vorruecken(&mut self, zeitstempel: u32) -> Duration {
        if let Some(vorher) = self.letzter {
            if !zeitstempel_vor(vorher, zeitstempel) {
                return self.pts;
            }
            let ticks = zeitstempel.wrapping_sub(vorher) as u64;
            self.pts += Duration::from_nanos(ticks * 1_000_000_000 / self.taktrate);
        }
        self.letzter = Some(zeitstempel);
        self.pts
    }
}

struct RekorderInner {
    zustand: Zustand,
    audio: Zusammensetzer<OpusPacket>,
    video: VideoEingang,
    audio_zeit: Zeitachse,
    video_zeit: Zeitachse,
    dateien: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Rekorder
// ---------------------------------------------------------------------------

pub struct Rekorder {
    konfig: RekorderKonfig,
    sitzungsstart: String,
    inner: Mutex<RekorderInner>,
}

impl Rekorder {
    pub fn neu(konfig: RekorderKonfig) -> Self {
        let (video, video_takt) = match konfig.video_codec {
            CodecTyp::H264 => (
                VideoEingang::H264(ZugriffseinheitPuffer::neu(konfig.video_max_late)),
                CodecInfo::h264().taktrate,
            ),
            _ => (
                VideoEingang::Vp8(Zusammensetzer::vp8(konfig.video_max_late)),
                CodecInfo::vp8().taktrate,
            ),
        };
        let inner = RekorderInner {
            zustand: Zustand::Uninitialisiert,
            audio: Zusammensetzer::opus(konfig.audio_max_late),
            video,
            audio_zeit: Zeitachse::neu(CodecInfo::opus().taktrate),
            video_zeit: Zeitachse::neu(video_takt),
            dateien: Vec::new(),
        };
        Self {
            sitzungsstart: chrono::Local::now().format("%Y%m%d-%H%M%S").to_string(),
            konfig,
            inner: Mutex::new(inner),
        }
    }

    /// Nimmt ein Audio-Paket des Publishers auf
    pub fn audio_paket(&self, paket: RtpPacket) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.ist_beendet() {
            return;
        }
        inner.audio.push(paket);
        while let Some(sample) = inner.audio.pop() {
            self.audio_sample(inner, sample);
        }
    }

    /// Nimmt ein Video-Paket des Publishers auf
    pub fn video_paket(&self, paket: RtpPacket) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.ist_beendet() {
            return;
        }
        let mut fertig = Vec::new();
        match &mut inner.video {
            VideoEingang::Vp8(builder) => {
                builder.push(paket);
                while let Some(sample) = builder.pop() {
                    fertig.push(sample);
                }
            }
            VideoEingang::H264(puffer) => fertig.extend(puffer.push(paket)),
        }
        for sample in fertig {
            self.video_sample(inner, sample);
        }
    }

    fn audio_sample(&self, inner: &mut RekorderInner, sample: Sample) {
        if inner.ist_beendet() {
            return;
        }
        let pts = inner.audio_zeit.vorruecken(sample.rtp_zeitstempel);

        let Zustand::Offen(datei) = &mut inner.zustand else {
            tracing::trace!(raum = %self.konfig.raum, "Audio vor erstem Keyframe verworfen");
            return;
        };
        let basis = *datei.audio_basis.get_or_insert(pts);
        let ergebnis = datei.schreiber.block_schreiben(
            AUDIO_SPUR,
            pts.saturating_sub(basis),
            true,
            &sample.daten,
        );
        if let Err(e) = ergebnis {
            self.fehlschlag(inner, e.into());
        }
    }

    fn video_sample(&self, inner: &mut RekorderInner, sample: Sample) {
        if inner.ist_beendet() {
            return;
        }
        let pts = inner.video_zeit.vorruecken(sample.rtp_zeitstempel);

        if sample.ist_keyframe {
            let aktuelle = match &inner.zustand {
                Zustand::Offen(d) => Some(d.aufloesung),
                _ => None,
            };
            if let Some(aufloesung) = self.aufloesung(&sample, aktuelle) {
                if aktuelle != Some(aufloesung) {
                    if let Err(e) = self.datei_wechseln(inner, aufloesung, pts) {
                        self.fehlschlag(inner, e);
                        return;
                    }
                }
            }
        }

        let Zustand::Offen(datei) = &mut inner.zustand else {
            return;
        };
        let ergebnis = datei.schreiber.block_schreiben(
            VIDEO_SPUR,
            pts.saturating_sub(datei.video_basis),
            sample.ist_keyframe,
            &sample.daten,
        );
        if let Err(e) = ergebnis {
            self.fehlschlag(inner, e.into());
        }
    }

    fn aufloesung(&self, sample: &Sample, aktuelle: Option<(u32, u32)>) -> Option<(u32, u32)> {
        match self.konfig.video_codec {
            CodecTyp::H264 => h264::aufloesung(&sample.daten)
                .or(aktuelle)
                .or(Some(self.konfig.h264_ersatz_aufloesung)),
            _ => vp8::aufloesung(&sample.daten),
        }
    }

    /// Schliesst die offene Datei und oeffnet eine fuer die neue Aufloesung
    fn datei_wechseln(
        &self,
        inner: &mut RekorderInner,
        aufloesung: (u32, u32),
        video_basis: Duration,
    ) -> MedienResult<()> {
        if let Zustand::Offen(alt) = std::mem::replace(&mut inner.zustand, Zustand::Uninitialisiert) {
            datei_schliessen(alt)?;
        }

        std::fs::create_dir_all(&self.konfig.verzeichnis)?;
        let pfad = self.dateipfad(aufloesung);
        let datei = File::create(&pfad)?;
        let spuren = self.spuren(aufloesung);
        let schreiber = WebmSchreiber::neu(BufWriter::new(datei), &spuren)?;

        tracing::info!(
            raum = %self.konfig.raum,
            datei = %pfad.display(),
            breite = aufloesung.0,
            hoehe = aufloesung.1,
            "Aufnahme gestartet"
        );

        inner.dateien.push(pfad.clone());
        inner.zustand = Zustand::Offen(OffeneDatei {
            schreiber,
            pfad,
            aufloesung,
            video_basis,
            audio_basis: None,
        });
        Ok(())
    }

    fn dateipfad(&self, (breite, hoehe): (u32, u32)) -> PathBuf {
        self.konfig.verzeichnis.join(format!(
            "{}_{}_{}x{}.webm",
            self.konfig.raum, self.sitzungsstart, breite, hoehe
        ))
    }

    fn spuren(&self, (breite, hoehe): (u32, u32)) -> [Spur; 2] {
        let opus = CodecInfo::opus();
        [
            Spur::Audio {
                nummer: AUDIO_SPUR,
                codec: CodecTyp::Opus,
                abtastrate: opus.taktrate as f64,
                kanaele: opus.kanaele as u64,
                standard_dauer: Duration::from_millis(20),
            },
            Spur::Video {
                nummer: VIDEO_SPUR,
                codec: self.konfig.video_codec,
                breite,
                hoehe,
                standard_dauer: Duration::from_nanos(33_333_333),
            },
        ]
    }

    fn fehlschlag(&self, inner: &mut RekorderInner, fehler: crate::error::MedienFehler) {
        tracing::error!(
            raum = %self.konfig.raum,
            fehler = %fehler,
            "Aufnahme-Fehler, Aufnahme fuer diesen Raum beendet"
        );
        inner.zustand = Zustand::Fehlgeschlagen;
    }

    /// Schliesst die Aufnahme endgueltig
    pub fn schliessen(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let rest = match &mut inner.video {
            VideoEingang::H264(puffer) => puffer.leeren(),
            VideoEingang::Vp8(_) => Vec::new(),
        };
        for sample in rest {
            self.video_sample(inner, sample);
        }

        match std::mem::replace(&mut inner.zustand, Zustand::Geschlossen) {
            Zustand::Offen(datei) => {
                let pfad = datei.pfad.clone();
                match datei_schliessen(datei) {
                    Ok(bloecke) => tracing::info!(
                        raum = %self.konfig.raum,
                        datei = %pfad.display(),
                        bloecke,
                        "Aufnahme abgeschlossen"
                    ),
                    Err(e) => tracing::error!(
                        raum = %self.konfig.raum,
                        fehler = %e,
                        "Aufnahme konnte nicht sauber geschlossen werden"
                    ),
                }
            }
            Zustand::Fehlgeschlagen => inner.zustand = Zustand::Fehlgeschlagen,
            _ => {}
        }
    }

    pub fn status(&self) -> RekorderStatus {
        match &self.inner.lock().zustand {
            Zustand::Uninitialisiert => RekorderStatus::Uninitialisiert,
            Zustand::Offen(d) => RekorderStatus::Offen {
                breite: d.aufloesung.0,
                hoehe: d.aufloesung.1,
            },
            Zustand::Geschlossen => RekorderStatus::Geschlossen,
            Zustand::Fehlgeschlagen => RekorderStatus::Fehlgeschlagen,
        }
    }

    /// Alle bisher angelegten Dateien in Reihenfolge
    pub fn dateien(&self) -> Vec<PathBuf> {
        self.inner.lock().dateien.clone()
    }

    pub fn verzeichnis(&self) -> &Path {
        &self.konfig.verzeichnis
    }
}

impl RekorderInner {
    fn ist_beendet(&self) -> bool {
        matches!(self.zustand, Zustand::Geschlossen | Zustand::Fehlgeschlagen)
    }
}

fn datei_schliessen(datei: OffeneDatei) -> MedienResult<u64> {
    let bloecke = datei.schreiber.bloecke();
    datei.schreiber.schliessen()?;
    Ok(bloecke)
}

// ---------------------------------------------------------------------------
// Schreib-Thread
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AufnahmePaket {
    Audio(RtpPacket),
    Video(RtpPacket),
}

/// Sendeseite einer laufenden Aufnahme
///
/// Der Schreib-Thread arbeitet die Pakete der Reihe nach ab. Sobald alle
/// Instanzen fallen gelassen wurden und der Kanal leer ist, schliesst er
/// den Rekorder.
#[derive(Clone)]
pub struct Aufnahme {
    sender: mpsc::Sender<AufnahmePaket>,
    rekorder: Arc<Rekorder>,
}

impl Aufnahme {
    /// Startet den Schreib-Thread; das Handle liefert die Anzahl
    /// verarbeiteter Pakete
    pub fn starten(rekorder: Arc<Rekorder>, kapazitaet: usize) -> (Self, JoinHandle<u64>) {
        let (sender, mut empfaenger) = mpsc::channel(kapazitaet.max(1));
        let schreiber = Arc::clone(&rekorder);
        let handle = tokio::task::spawn_blocking(move || {
            let mut pakete = 0;
            while let Some(paket) = empfaenger.blocking_recv() {
                match paket {
                    AufnahmePaket::Audio(p) => schreiber.audio_paket(p),
                    AufnahmePaket::Video(p) => schreiber.video_paket(p),
                }
                pakete += 1;
            }
            schreiber.schliessen();
            tracing::debug!(raum = %schreiber.konfig.raum, pakete, "Schreib-Thread beendet");
            pakete
        });
        (Self { sender, rekorder }, handle)
    }

    /// Bietet ein Paket an; `false` wenn es verworfen wurde
    pub fn anbieten(&self, paket: AufnahmePaket) -> bool {
        match self.sender.try_send(paket) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(raum = %self.rekorder.konfig.raum, "Aufnahme-Kanal voll, Paket verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn rekorder(&self) -> &Arc<Rekorder> {
        &self.rekorder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raumfunk_protocol::rtp_paket;

    fn vp8_keyframe(seq: u16, ts: u32, breite: u16, hoehe: u16) -> RtpPacket {
        let mut payload = vec![0x10, 0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a];
        payload.extend_from_slice(&breite.to_le_bytes());
        payload.extend_from_slice(&hoehe.to_le_bytes());
        rtp_paket(96, seq, ts, 1, true, payload)
    }

    fn vp8_interframe(seq: u16, ts: u32) -> RtpPacket {
        rtp_paket(96, seq, ts, 1, true, vec![0x10, 0x11, 0xAB, 0xCD])
    }

    fn opus(seq: u16, ts: u32) -> RtpPacket {
        rtp_paket(111, seq, ts, 2, false, vec![0xFC, 0x01])
    }

    fn offen(breite: u32, hoehe: u32) -> RekorderStatus {
        RekorderStatus::Offen { breite, hoehe }
    }

    #[test]
    fn audio_vor_keyframe_wird_verworfen() {
        let dir = tempfile::tempdir().unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::Vp8));
        r.audio_paket(opus(1, 0));
        r.video_paket(vp8_interframe(1, 0));
        assert_eq!(r.status(), RekorderStatus::Uninitialisiert);
        assert!(r.dateien().is_empty());

        // Ein Sample wird erst mit dem Nachfolger fertig
        r.video_paket(vp8_keyframe(2, 3000, 640, 360));
        assert_eq!(r.status(), RekorderStatus::Uninitialisiert);
        r.video_paket(vp8_interframe(3, 6000));
        assert_eq!(r.status(), offen(640, 360));
        r.schliessen();

        let datei = crate::webm::lesen(&r.dateien()[0]).unwrap();
        assert_eq!(datei.bloecke_der_spur(AUDIO_SPUR).count(), 0);
        assert_eq!(datei.bloecke_der_spur(VIDEO_SPUR).count(), 1);
    }

    #[test]
    fn dateiname_enthaelt_raum_und_aufloesung() {
        let dir = tempfile::tempdir().unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(dir.path(), "flur", CodecTyp::Vp8));
        r.video_paket(vp8_keyframe(1, 0, 320, 240));
        r.video_paket(vp8_interframe(2, 3000));
        let name = r.dateien()[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("flur_"));
        assert!(name.ends_with("_320x240.webm"));
    }

    #[test]
    fn nach_schliessen_wirkungslos() {
        let dir = tempfile::tempdir().unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::Vp8));
        r.schliessen();
        r.video_paket(vp8_keyframe(1, 0, 640, 360));
        assert_eq!(r.status(), RekorderStatus::Geschlossen);
        assert!(r.dateien().is_empty());
    }

    #[test]
    fn unbeschreibbares_verzeichnis_beendet_aufnahme() {
        let dir = tempfile::tempdir().unwrap();
        let blockiert = dir.path().join("datei");
        std::fs::write(&blockiert, b"x").unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(blockiert.join("sub"), "r1", CodecTyp::Vp8));
        r.video_paket(vp8_keyframe(1, 0, 640, 360));
        r.video_paket(vp8_interframe(2, 3000));
        assert_eq!(r.status(), RekorderStatus::Fehlgeschlagen);
        r.video_paket(vp8_keyframe(3, 6000, 640, 360));
        r.video_paket(vp8_interframe(4, 9000));
        assert_eq!(r.status(), RekorderStatus::Fehlgeschlagen);
    }

    #[test]
    fn h264_ohne_sps_nutzt_ersatzaufloesung() {
        let dir = tempfile::tempdir().unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::H264));
        r.video_paket(rtp_paket(102, 1, 0, 3, true, vec![0x65, 0x88, 0x84]));
        // Einheit wird erst mit dem naechsten Zeitstempel abgeschlossen
        assert_eq!(r.status(), RekorderStatus::Uninitialisiert);
        r.video_paket(rtp_paket(102, 2, 3000, 3, true, vec![0x41, 0x9A, 0x01]));
        assert_eq!(r.status(), offen(1280, 720));
        r.schliessen();
        let datei = crate::webm::lesen(&r.dateien()[0]).unwrap();
        assert_eq!(datei.spuren[1].codec_id, "V_MPEG4/ISO/AVC");
        assert_eq!(datei.bloecke_der_spur(VIDEO_SPUR).count(), 2);
    }

    #[test]
    fn videozeit_folgt_rtp_zeitstempeln() {
        let dir = tempfile::tempdir().unwrap();
        let r = Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::Vp8));
        r.video_paket(vp8_keyframe(1, 90_000, 640, 360));
        r.video_paket(vp8_interframe(2, 93_000));
        // Frame mit ts 96000 fehlt komplett
        r.video_paket(vp8_interframe(3, 99_000));
        r.video_paket(vp8_interframe(4, 102_000));
        r.schliessen();

        let datei = crate::webm::lesen(&r.dateien()[0]).unwrap();
        let zeiten: Vec<i64> = datei.bloecke_der_spur(VIDEO_SPUR).map(|b| b.zeit_ms).collect();
        assert_eq!(zeiten, vec![0, 33, 100]);
    }

    #[test]
    fn rueckwaerts_springender_zeitstempel_haelt_zeit_an() {
        let mut z = Zeitachse::neu(90_000);
        assert_eq!(z.vorruecken(9000), Duration::ZERO);
        assert_eq!(z.vorruecken(18_000), Duration::from_millis(100));
        assert_eq!(z.vorruecken(3000), Duration::from_millis(100));
        assert_eq!(z.vorruecken(27_000), Duration::from_millis(200));
        // Umlauf
        let mut z = Zeitachse::neu(90_000);
        z.vorruecken(u32::MAX - 899);
        assert_eq!(z.vorruecken(8100), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn aufnahme_schreibt_im_eigenen_thread() {
        let dir = tempfile::tempdir().unwrap();
        let rekorder = Arc::new(Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::Vp8)));
        let (aufnahme, handle) = Aufnahme::starten(Arc::clone(&rekorder), 16);

        assert!(aufnahme.anbieten(AufnahmePaket::Video(vp8_keyframe(1, 0, 640, 360))));
        assert!(aufnahme.anbieten(AufnahmePaket::Video(vp8_interframe(2, 3000))));
        assert!(aufnahme.anbieten(AufnahmePaket::Audio(opus(1, 0))));
        drop(aufnahme);

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(rekorder.status(), RekorderStatus::Geschlossen);
        let datei = crate::webm::lesen(&rekorder.dateien()[0]).unwrap();
        assert_eq!(datei.bloecke_der_spur(VIDEO_SPUR).count(), 1);
    }

    #[tokio::test]
    async fn voller_aufnahme_kanal_verwirft() {
        let dir = tempfile::tempdir().unwrap();
        let rekorder = Arc::new(Rekorder::neu(RekorderKonfig::neu(dir.path(), "r1", CodecTyp::Vp8)));
        let (sender, _empfaenger) = mpsc::channel(1);
        let aufnahme = Aufnahme { sender, rekorder };
        assert!(aufnahme.anbieten(AufnahmePaket::Audio(opus(1, 0))));
        assert!(!aufnahme.anbieten(AufnahmePaket::Audio(opus(2, 960))));
    }
}
