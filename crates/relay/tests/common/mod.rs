//! In-Memory-Transport fuer die Integrationstests
//!
//! Verbindungen werden von der Fabrik protokolliert. Tests speisen Tracks
//! und Zustandswechsel ueber die Verbindung ein und lesen mit, was in die
//! lokal angelegten Tracks geschrieben wurde.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use raumfunk_core::{CodecInfo, MedienArt, VerbindungsZustand};
use raumfunk_protocol::{rtp_paket, RtpPacket};
use raumfunk_relay::{
    KontrollLeser, LokalerTrack, PaketSink, PeerVerbindung, TrackLeser, TransportFabrik,
    TransportFehler, VerbindungsEreignis,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Sinks und Tracks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SammelSink {
    pakete: Mutex<Vec<RtpPacket>>,
}

impl SammelSink {
    pub fn pakete(&self) -> Vec<RtpPacket> {
        self.pakete.lock().clone()
    }

    pub fn sequenzen(&self) -> Vec<u16> {
        self.pakete
            .lock()
            .iter()
            .map(|p| p.header.sequence_number)
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.pakete.lock().len()
    }
}

#[async_trait]
impl PaketSink for SammelSink {
    async fn schreiben(&self, paket: &RtpPacket) -> Result<(), TransportFehler> {
        self.pakete.lock().push(paket.clone());
        Ok(())
    }
}

/// Kontrollkanal, der bis zum Schliessen der Verbindung blockiert
struct FakeKontrolle {
    geschlossen: CancellationToken,
}

#[async_trait]
impl KontrollLeser for FakeKontrolle {
    async fn lesen(&self) -> Result<(), TransportFehler> {
        self.geschlossen.cancelled().await;
        Err(TransportFehler::Geschlossen)
    }
}

pub struct FakeTrack {
    codec: CodecInfo,
    eingang: tokio::sync::Mutex<mpsc::Receiver<RtpPacket>>,
}

#[async_trait]
impl TrackLeser for FakeTrack {
    fn codec(&self) -> CodecInfo {
        self.codec.clone()
    }

    async fn lesen(&self) -> Result<(RtpPacket, bool), TransportFehler> {
        match self.eingang.lock().await.recv().await {
            Some(paket) => Ok((paket, false)),
            None => Err(TransportFehler::Geschlossen),
        }
    }
}

/// Track plus Sendeseite, ueber die der Test Pakete einspeist
pub fn track(codec: CodecInfo) -> (Arc<FakeTrack>, mpsc::Sender<RtpPacket>) {
    let (tx, rx) = mpsc::channel(1024);
    let track = Arc::new(FakeTrack {
        codec,
        eingang: tokio::sync::Mutex::new(rx),
    });
    (track, tx)
}

// ---------------------------------------------------------------------------
// Verbindung und Fabrik
// ---------------------------------------------------------------------------

pub struct FakeVerbindung {
    ereignis_tx: mpsc::Sender<VerbindungsEreignis>,
    ereignis_rx: Mutex<Option<mpsc::Receiver<VerbindungsEreignis>>>,
    lokale: Mutex<Vec<(MedienArt, CodecInfo, Arc<SammelSink>)>>,
    geschlossen: CancellationToken,
    aushandlung_scheitert: bool,
}

impl FakeVerbindung {
    fn neu(aushandlung_scheitert: bool) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            ereignis_tx: tx,
            ereignis_rx: Mutex::new(Some(rx)),
            lokale: Mutex::new(Vec::new()),
            geschlossen: CancellationToken::new(),
            aushandlung_scheitert,
        }
    }

    /// Die Gegenstelle beginnt einen Track zu senden
    pub async fn track_senden(&self, codec: CodecInfo) -> mpsc::Sender<RtpPacket> {
        let (track, tx) = track(codec);
        self.ereignis_tx
            .send(VerbindungsEreignis::Track(track))
            .await
            .unwrap();
        tx
    }

    pub async fn zustand(&self, zustand: VerbindungsZustand) {
        self.ereignis_tx
            .send(VerbindungsEreignis::Zustand(zustand))
            .await
            .unwrap();
    }

    /// Erster lokal angelegter Track der Medienart
    pub fn lokaler_sink(&self, art: MedienArt) -> Arc<SammelSink> {
        self.lokale
            .lock()
            .iter()
            .find(|(a, _, _)| *a == art)
            .map(|(_, _, s)| Arc::clone(s))
            .expect("kein lokaler Track dieser Art")
    }

    pub fn lokaler_codec(&self, art: MedienArt) -> CodecInfo {
        self.lokale
            .lock()
            .iter()
            .find(|(a, _, _)| *a == art)
            .map(|(_, c, _)| c.clone())
            .expect("kein lokaler Track dieser Art")
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.is_cancelled()
    }
}

#[async_trait]
impl PeerVerbindung for FakeVerbindung {
    fn lokalen_track_anlegen(
        &self,
        art: MedienArt,
        codec: CodecInfo,
    ) -> Result<LokalerTrack, TransportFehler> {
        let sink = Arc::new(SammelSink::default());
        self.lokale.lock().push((art, codec, Arc::clone(&sink)));
        Ok(LokalerTrack {
            sink,
            kontrolle: Box::new(FakeKontrolle {
                geschlossen: self.geschlossen.clone(),
            }),
        })
    }

    async fn aushandeln(&self, angebot: &str) -> Result<String, TransportFehler> {
        if self.aushandlung_scheitert {
            return Err(TransportFehler::Aushandlung("kein gemeinsamer Codec".into()));
        }
        Ok(format!("answer:{angebot}"))
    }

    fn ereignisse_abholen(&self) -> Option<mpsc::Receiver<VerbindungsEreignis>> {
        self.ereignis_rx.lock().take()
    }

    async fn schliessen(&self) {
        self.geschlossen.cancel();
    }
}

#[derive(Default)]
pub struct FakeFabrik {
    verbindungen: Mutex<Vec<Arc<FakeVerbindung>>>,
    aushandlung_scheitert: Mutex<bool>,
}

impl FakeFabrik {
    /// Alle Verbindungen, die ab jetzt entstehen, scheitern bei der Aushandlung
    pub fn aushandlung_scheitern_lassen(&self, ja: bool) {
        *self.aushandlung_scheitert.lock() = ja;
    }

    /// n-te erzeugte Verbindung (0 = erste)
    pub fn verbindung(&self, n: usize) -> Arc<FakeVerbindung> {
        Arc::clone(&self.verbindungen.lock()[n])
    }

    pub fn anzahl(&self) -> usize {
        self.verbindungen.lock().len()
    }
}

impl TransportFabrik for FakeFabrik {
    fn verbindung_erstellen(&self) -> Result<Arc<dyn PeerVerbindung>, TransportFehler> {
        let verbindung = Arc::new(FakeVerbindung::neu(*self.aushandlung_scheitert.lock()));
        self.verbindungen.lock().push(Arc::clone(&verbindung));
        Ok(verbindung)
    }
}

// ---------------------------------------------------------------------------
// Hilfen
// ---------------------------------------------------------------------------

/// Wartet bis die Bedingung gilt (hoechstens zwei Sekunden)
pub async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    let frist = tokio::time::Instant::now() + Duration::from_secs(2);
    while !bedingung() {
        assert!(
            tokio::time::Instant::now() < frist,
            "Bedingung nicht rechtzeitig erfuellt"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn vp8_keyframe(seq: u16, ts: u32, breite: u16, hoehe: u16) -> RtpPacket {
    let mut payload = vec![0x10, 0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a];
    payload.extend_from_slice(&breite.to_le_bytes());
    payload.extend_from_slice(&hoehe.to_le_bytes());
    payload.extend_from_slice(&[0u8; 16]);
    rtp_paket(96, seq, ts, 0x1111, true, payload)
}

pub fn vp8_interframe(seq: u16, ts: u32) -> RtpPacket {
    rtp_paket(96, seq, ts, 0x1111, true, vec![0x10, 0x01, 0xAA, 0xBB])
}

pub fn opus(seq: u16, pt: u8) -> RtpPacket {
    rtp_paket(pt, seq, seq as u32 * 960, 0x2222, false, vec![0xFC, 0xFF, 0xFE])
}
