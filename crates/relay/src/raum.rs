//! Zustand eines Raums
//!
//! Ein Raum hat hoechstens einen Publisher und beliebig viele Abonnenten.
//! Jede Ressourcenklasse liegt hinter einem eigenen Lock, die Paket-Tasks
//! halten nur `Arc<Raum>` und pruefen das Abbruch-Token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use raumfunk_core::{CodecInfo, TeilnehmerId};
use raumfunk_media::{Aufnahme, Rekorder, Schnappschuss};
use raumfunk_protocol::RaumInfo;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ausgang::AusgangsPaket;
use crate::sinks::SinkRegister;
use crate::transport::{PaketSink, PeerVerbindung};

/// Publisher-seitiger Zustand, gesetzt waehrend des Veroeffentlichens
#[derive(Default)]
struct PublisherZustand {
    verbindung: Option<Arc<dyn PeerVerbindung>>,
    video_codec: Option<CodecInfo>,
    audio_codec: Option<CodecInfo>,
    /// Gemeinsamer Audio-Sink fuer Mikrofone und Dateien
    audio_sink: Option<Arc<dyn PaketSink>>,
}

/// Registrierter Abonnent
struct Abonnent {
    verbindung: Arc<dyn PeerVerbindung>,
    abbruch: CancellationToken,
}

pub struct Raum {
    name: String,
    erstellt: DateTime<Utc>,
    abbruch: CancellationToken,
    abgebaut: AtomicBool,
    spielt_datei: Arc<AtomicBool>,

    publisher: Mutex<PublisherZustand>,
    ausgang: Mutex<Option<mpsc::Sender<AusgangsPaket>>>,
    aufnahme: Mutex<Option<Aufnahme>>,
    schnappschuss: Mutex<Option<Schnappschuss>>,

    video_sinks: SinkRegister,
    audio_sinks: SinkRegister,
    abonnenten: DashMap<TeilnehmerId, Abonnent>,
}

impl Raum {
    pub fn neu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            erstellt: Utc::now(),
            abbruch: CancellationToken::new(),
            abgebaut: AtomicBool::new(false),
            spielt_datei: Arc::new(AtomicBool::new(false)),
            publisher: Mutex::new(PublisherZustand::default()),
            ausgang: Mutex::new(None),
            aufnahme: Mutex::new(None),
            schnappschuss: Mutex::new(None),
            video_sinks: SinkRegister::neu(),
            audio_sinks: SinkRegister::neu(),
            abonnenten: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn erstellt(&self) -> DateTime<Utc> {
        self.erstellt
    }

    pub fn info(&self) -> RaumInfo {
        RaumInfo {
            name: self.name.clone(),
            created_at: self.erstellt,
        }
    }

    pub fn abbruch(&self) -> CancellationToken {
        self.abbruch.clone()
    }

    pub fn ist_abgebaut(&self) -> bool {
        self.abbruch.is_cancelled()
    }

    /// Flag "spielt Datei", geteilt mit dem Einspeiser
    pub fn spielt_datei(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.spielt_datei)
    }

    pub fn spielt_gerade_datei(&self) -> bool {
        self.spielt_datei.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Publisher
    // -----------------------------------------------------------------------

    /// Belegt den Publisher-Platz; `false` wenn schon belegt
    pub fn publisher_beanspruchen(&self, verbindung: Arc<dyn PeerVerbindung>) -> bool {
        let mut publisher = self.publisher.lock();
        if publisher.verbindung.is_some() {
            return false;
        }
        publisher.verbindung = Some(verbindung);
        true
    }

    /// Gibt den Platz nach fehlgeschlagenem Veroeffentlichen wieder frei
    pub fn publisher_freigeben(&self) {
        *self.publisher.lock() = PublisherZustand::default();
    }

    pub fn hat_publisher(&self) -> bool {
        self.publisher.lock().verbindung.is_some()
    }

    pub fn video_codec(&self) -> Option<CodecInfo> {
        self.publisher.lock().video_codec.clone()
    }

    pub fn video_codec_setzen(&self, codec: CodecInfo) {
        self.publisher.lock().video_codec = Some(codec);
    }

    pub fn audio_codec(&self) -> Option<CodecInfo> {
        self.publisher.lock().audio_codec.clone()
    }

    pub fn audio_codec_setzen(&self, codec: CodecInfo) {
        self.publisher.lock().audio_codec = Some(codec);
    }

    pub fn publisher_audio_setzen(&self, sink: Arc<dyn PaketSink>) {
        self.publisher.lock().audio_sink = Some(sink);
    }

    pub fn publisher_audio(&self) -> Option<Arc<dyn PaketSink>> {
        self.publisher.lock().audio_sink.clone()
    }

    // -----------------------------------------------------------------------
    // Ausgang, Aufnahme, Schnappschuss
    // -----------------------------------------------------------------------

    pub fn ausgang_setzen(&self, sender: mpsc::Sender<AusgangsPaket>) {
        *self.ausgang.lock() = Some(sender);
    }

    /// Sendeseite des Ausgangskanals; `None` ohne Publisher oder nach dem Abbau
    pub fn ausgang(&self) -> Option<mpsc::Sender<AusgangsPaket>> {
        self.ausgang.lock().clone()
    }

    /// Setzt die laufende Aufnahme, falls noch keine laeuft
    pub fn aufnahme_setzen(&self, aufnahme: Aufnahme) -> bool {
        let mut slot = self.aufnahme.lock();
        if slot.is_some() || self.ist_abgebaut() {
            return false;
        }
        *slot = Some(aufnahme);
        true
    }

    pub fn aufnahme(&self) -> Option<Aufnahme> {
        self.aufnahme.lock().clone()
    }

    pub fn rekorder(&self) -> Option<Arc<Rekorder>> {
        self.aufnahme.lock().as_ref().map(|a| Arc::clone(a.rekorder()))
    }

    pub fn schnappschuss_setzen(&self, schnappschuss: Schnappschuss) -> bool {
        let mut slot = self.schnappschuss.lock();
        if slot.is_some() || self.ist_abgebaut() {
            return false;
        }
        *slot = Some(schnappschuss);
        true
    }

    pub fn schnappschuss(&self) -> Option<Schnappschuss> {
        self.schnappschuss.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Abonnenten
    // -----------------------------------------------------------------------

    pub fn video_sinks(&self) -> &SinkRegister {
        &self.video_sinks
    }

    pub fn audio_sinks(&self) -> &SinkRegister {
        &self.audio_sinks
    }

    pub fn hat_abonnent(&self, id: &TeilnehmerId) -> bool {
        self.abonnenten.contains_key(id)
    }

    /// Reserviert die ID; liefert das Abbruch-Token des Abonnenten
    ///
    /// `None` wenn die ID im Raum bereits vergeben ist.
    pub fn abonnent_beanspruchen(
        &self,
        id: TeilnehmerId,
        verbindung: Arc<dyn PeerVerbindung>,
    ) -> Option<CancellationToken> {
        match self.abonnenten.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(frei) => {
                let abbruch = self.abbruch.child_token();
                frei.insert(Abonnent {
                    verbindung,
                    abbruch: abbruch.clone(),
                });
                Some(abbruch)
            }
        }
    }

    /// Meldet die Sinks eines Abonnenten beim Router an
    pub fn abonnent_sinks_registrieren(
        &self,
        id: &TeilnehmerId,
        video: Arc<dyn PaketSink>,
        audio: Arc<dyn PaketSink>,
    ) {
        self.video_sinks.registrieren(id.clone(), video);
        self.audio_sinks.registrieren(id.clone(), audio);
    }

    /// Entfernt genau diesen Abonnenten und liefert seine Verbindung
    pub fn abonnent_entfernen(&self, id: &TeilnehmerId) -> Option<Arc<dyn PeerVerbindung>> {
        self.video_sinks.entfernen(id);
        self.audio_sinks.entfernen(id);
        let (_, abonnent) = self.abonnenten.remove(id)?;
        abonnent.abbruch.cancel();
        Some(abonnent.verbindung)
    }

    /// Abonnenten mit registrierten Sinks, in Registrierungsreihenfolge
    pub fn abonnenten(&self) -> Vec<TeilnehmerId> {
        self.video_sinks.ids()
    }

    pub fn abonnenten_anzahl(&self) -> usize {
        self.abonnenten.len()
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Baut den Raum ab; weitere Aufrufe sind wirkungslos
    ///
    /// Setzt das Abbruch-Token, schliesst den Ausgangskanal, beendet Aufnahme
    /// und Schnappschuesse und schliesst alle Verbindungen.
    pub async fn abbauen(&self) {
        if self.abgebaut.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abbruch.cancel();

        self.ausgang.lock().take();
        self.schnappschuss.lock().take();
        // Der Schreib-Thread schliesst die Datei, sobald der Kanal leer ist
        self.aufnahme.lock().take();

        self.video_sinks.leeren();
        self.audio_sinks.leeren();

        let mut verbindungen: Vec<Arc<dyn PeerVerbindung>> = Vec::new();
        let ids: Vec<TeilnehmerId> = self.abonnenten.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, abonnent)) = self.abonnenten.remove(&id) {
                verbindungen.push(abonnent.verbindung);
            }
        }
        let publisher = std::mem::take(&mut *self.publisher.lock());
        if let Some(v) = publisher.verbindung {
            verbindungen.push(v);
        }

        for verbindung in verbindungen {
            verbindung.schliessen().await;
        }
        tracing::debug!(raum = %self.name, "Raum abgebaut");
    }
}

impl std::fmt::Debug for Raum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raum")
            .field("name", &self.name)
            .field("erstellt", &self.erstellt)
            .field("abgebaut", &self.ist_abgebaut())
            .field("abonnenten", &self.abonnenten.len())
            .finish()
    }
}
