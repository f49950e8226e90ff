//! Konferenz-Dienst – Raeume, Publisher und Abonnenten
//!
//! Nimmt die Setup-Operationen entgegen (Raum anlegen, veroeffentlichen,
//! abonnieren, Datei abspielen, auflisten) und startet pro Richtung genau
//! einen Task. Fehler in den Paket-Schleifen werden geloggt und beenden
//! hoechstens die betroffene Schleife; nur Setup-Fehler gehen an den
//! Aufrufer zurueck.
//!
//! ## Tasks
//! - Publisher-Video und -Audio: je ein Lese-Task (Router, Aufnahme,
//!   Schnappschuss)
//! - Ausgang: ein Task pro Raum leert den Ausgangskanal zum Publisher
//! - Abonnenten: ein Ereignis-Task, ein Mikrofon-Task und je ein Task zum
//!   Leeren der Kontrollkanaele

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use raumfunk_core::{CodecInfo, CodecTyp, MedienArt, RaumfunkError, Result, TeilnehmerId};
use raumfunk_media::{
    Aufnahme, AufnahmePaket, Rekorder, RekorderKonfig, Schnappschuss, SchnappschussKonfig,
    Vp8Dekoder,
};
use raumfunk_protocol::{Antwort, Befehl, RaumInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ausgang::{ausgangs_schleife, AusgangsPaket, Quelle};
use crate::config::RelayKonfig;
use crate::einspeiser::DateiEinspeiser;
use crate::raum::Raum;
use crate::registry::RaumRegistry;
use crate::router::{PaketRouter, RouterStatistik};
use crate::transport::{
    KontrollLeser, PeerVerbindung, TrackLeser, TransportFabrik, TransportFehler,
    VerbindungsEreignis,
};

fn transport_fehler(e: TransportFehler) -> RaumfunkError {
    RaumfunkError::Transport(e.to_string())
}

/// Prueft einen Raumnamen (nicht leer, kein Pfadtrenner)
pub fn raumname_pruefen(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
        return Err(RaumfunkError::UngueltigerRaumname(name.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Konferenz {
    inner: Arc<KonferenzInner>,
}

struct KonferenzInner {
    registry: Arc<RaumRegistry>,
    fabrik: Arc<dyn TransportFabrik>,
    konfig: RelayKonfig,
    router: PaketRouter,
    einspeiser: DateiEinspeiser,
}

impl Konferenz {
    pub fn neu(
        registry: Arc<RaumRegistry>,
        fabrik: Arc<dyn TransportFabrik>,
        konfig: RelayKonfig,
    ) -> Self {
        let einspeiser = DateiEinspeiser::neu(konfig.einspeisung.clone());
        Self {
            inner: Arc::new(KonferenzInner {
                registry,
                fabrik,
                konfig,
                router: PaketRouter::neu(),
                einspeiser,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<RaumRegistry> {
        &self.inner.registry
    }

    pub fn router_statistik(&self) -> RouterStatistik {
        self.inner.router.statistik()
    }

    // -----------------------------------------------------------------------
    // Raeume
    // -----------------------------------------------------------------------

    pub fn raum_erstellen(&self, name: &str) -> Result<Arc<Raum>> {
        raumname_pruefen(name)?;
        let raum = self.inner.registry.erstellen(name)?;
        tracing::info!(raum = %name, "Raum angelegt");
        Ok(raum)
    }

    pub fn raeume_auflisten(&self) -> Vec<RaumInfo> {
        self.inner.registry.auflisten()
    }

    fn raum_holen(&self, name: &str) -> Result<Arc<Raum>> {
        self.inner
            .registry
            .holen(name)
            .ok_or_else(|| RaumfunkError::RaumNichtGefunden(name.to_string()))
    }

    /// Entfernt den Raum aus dem Register und baut ihn ab
    pub async fn raum_abbauen(&self, raum: &Arc<Raum>) {
        let entfernt = self.inner.registry.entfernen_wenn(raum.name(), raum);
        raum.abbauen().await;
        if entfernt {
            tracing::info!(raum = %raum.name(), "Raum entfernt");
        }
    }

    /// Baut alle Raeume ab (Shutdown)
    pub async fn herunterfahren(&self) {
        for info in self.raeume_auflisten() {
            if let Some(raum) = self.inner.registry.holen(&info.name) {
                self.raum_abbauen(&raum).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Publisher
    // -----------------------------------------------------------------------

    /// Verbindet den Publisher mit dem Raum und liefert die SDP-Antwort
    pub async fn veroeffentlichen(&self, raum_name: &str, angebot: &str) -> Result<String> {
        let raum = self.raum_holen(raum_name)?;
        if raum.hat_publisher() {
            return Err(RaumfunkError::PublisherVorhanden(raum_name.to_string()));
        }

        let verbindung = self
            .inner
            .fabrik
            .verbindung_erstellen()
            .map_err(transport_fehler)?;
        if !raum.publisher_beanspruchen(Arc::clone(&verbindung)) {
            verbindung.schliessen().await;
            return Err(RaumfunkError::PublisherVorhanden(raum_name.to_string()));
        }

        match self.publisher_einrichten(&raum, &verbindung, angebot).await {
            Ok(antwort) => {
                tracing::info!(raum = %raum_name, "Publisher verbunden");
                Ok(antwort)
            }
            Err(e) => {
                tracing::warn!(raum = %raum_name, fehler = %e, "Veroeffentlichen fehlgeschlagen");
                raum.publisher_freigeben();
                verbindung.schliessen().await;
                Err(e)
            }
        }
    }

    async fn publisher_einrichten(
        &self,
        raum: &Arc<Raum>,
        verbindung: &Arc<dyn PeerVerbindung>,
        angebot: &str,
    ) -> Result<String> {
        let audio = verbindung
            .lokalen_track_anlegen(MedienArt::Audio, CodecInfo::opus())
            .map_err(transport_fehler)?;
        let ereignisse = verbindung
            .ereignisse_abholen()
            .ok_or_else(|| RaumfunkError::intern("Ereignisstrom bereits abgeholt"))?;
        let antwort = verbindung
            .aushandeln(angebot)
            .await
            .map_err(transport_fehler)?;

        let abbruch = raum.abbruch();
        kontrolle_leeren(raum.name(), "publisher", audio.kontrolle, abbruch.clone());
        raum.publisher_audio_setzen(Arc::clone(&audio.sink));

        let ausgang = &self.inner.konfig.ausgang;
        let (sender, empfaenger) = mpsc::channel(ausgang.kapazitaet.max(1));
        raum.ausgang_setzen(sender);
        tokio::spawn(ausgangs_schleife(
            raum.name().to_string(),
            empfaenger,
            audio.sink,
            ausgang.payload_typ,
            ausgang.start_sequenz,
            abbruch,
        ));

        tokio::spawn(self.clone().publisher_ereignisse(Arc::clone(raum), ereignisse));
        Ok(antwort)
    }

    async fn publisher_ereignisse(
        self,
        raum: Arc<Raum>,
        mut ereignisse: mpsc::Receiver<VerbindungsEreignis>,
    ) {
        let abbruch = raum.abbruch();
        loop {
            let ereignis = tokio::select! {
                _ = abbruch.cancelled() => break,
                e = ereignisse.recv() => e,
            };
            match ereignis {
                Some(VerbindungsEreignis::Track(track)) => self.publisher_track(&raum, track),
                Some(VerbindungsEreignis::Zustand(zustand)) => {
                    tracing::info!(raum = %raum.name(), ?zustand, "Publisher-Zustand");
                    if zustand.ist_beendet() {
                        break;
                    }
                }
                None => {
                    tracing::debug!(raum = %raum.name(), "Publisher-Ereignisstrom beendet");
                    break;
                }
            }
        }
        self.raum_abbauen(&raum).await;
    }

    fn publisher_track(&self, raum: &Arc<Raum>, track: Arc<dyn TrackLeser>) {
        let codec = track.codec();
        tracing::info!(raum = %raum.name(), codec = ?codec.typ, "Publisher-Track eingetroffen");

        match codec.medien_art() {
            MedienArt::Video => {
                raum.video_codec_setzen(codec.clone());
                self.aufnahme_starten(raum, codec.typ);
                if codec.typ == CodecTyp::Vp8 {
                    self.schnappschuss_starten(raum);
                }
                tokio::spawn(eingangs_schleife(
                    self.inner.router.clone(),
                    Arc::clone(raum),
                    track,
                    MedienArt::Video,
                ));
            }
            MedienArt::Audio => {
                raum.audio_codec_setzen(codec);
                tokio::spawn(eingangs_schleife(
                    self.inner.router.clone(),
                    Arc::clone(raum),
                    track,
                    MedienArt::Audio,
                ));
            }
        }
    }

    fn aufnahme_starten(&self, raum: &Raum, video_codec: CodecTyp) {
        let Some(aufnahme) = &self.inner.konfig.aufnahme else {
            return;
        };
        if raum.aufnahme().is_some() {
            return;
        }
        let konfig = RekorderKonfig {
            verzeichnis: aufnahme.verzeichnis.clone(),
            raum: raum.name().to_string(),
            video_codec,
            audio_max_late: aufnahme.audio_max_late,
            video_max_late: aufnahme.video_max_late,
            h264_ersatz_aufloesung: aufnahme.h264_ersatz_aufloesung,
        };
        let rekorder = Arc::new(Rekorder::neu(konfig));
        let (laufend, _handle) = Aufnahme::starten(rekorder, aufnahme.kapazitaet);
        if raum.aufnahme_setzen(laufend) {
            tracing::info!(raum = %raum.name(), verzeichnis = %aufnahme.verzeichnis.display(), "Aufnahme aktiv");
        }
    }

    fn schnappschuss_starten(&self, raum: &Raum) {
        let Some(einstellung) = &self.inner.konfig.schnappschuss else {
            return;
        };
        if raum.schnappschuss().is_some() {
            return;
        }
        let konfig = SchnappschussKonfig {
            verzeichnis: einstellung.verzeichnis.clone(),
            raum: raum.name().to_string(),
            max_late: einstellung.max_late,
            kapazitaet: einstellung.kapazitaet,
        };
        let (schnappschuss, _handle) = Schnappschuss::starten(konfig, Box::new(Vp8Dekoder));
        if raum.schnappschuss_setzen(schnappschuss) {
            tracing::info!(raum = %raum.name(), "Schnappschuesse aktiv");
        }
    }

    // -----------------------------------------------------------------------
    // Abonnenten
    // -----------------------------------------------------------------------

    /// Verbindet einen Abonnenten und liefert die SDP-Antwort
    pub async fn abonnieren(
        &self,
        raum_name: &str,
        abonnent: TeilnehmerId,
        angebot: &str,
    ) -> Result<String> {
        let raum = self.raum_holen(raum_name)?;
        let video_codec = raum
            .video_codec()
            .ok_or_else(|| RaumfunkError::PublisherNichtBereit(raum_name.to_string()))?;
        let vorhanden = || RaumfunkError::AbonnentVorhanden {
            raum: raum_name.to_string(),
            abonnent: abonnent.to_string(),
        };
        if raum.hat_abonnent(&abonnent) {
            return Err(vorhanden());
        }

        let verbindung = self
            .inner
            .fabrik
            .verbindung_erstellen()
            .map_err(transport_fehler)?;
        let Some(abbruch) = raum.abonnent_beanspruchen(abonnent.clone(), Arc::clone(&verbindung))
        else {
            verbindung.schliessen().await;
            return Err(vorhanden());
        };

        let ergebnis = self
            .abonnent_einrichten(&raum, &abonnent, &verbindung, video_codec, angebot, abbruch)
            .await;
        match ergebnis {
            Ok(antwort) => {
                tracing::info!(raum = %raum_name, abonnent = %abonnent, "Abonnent verbunden");
                Ok(antwort)
            }
            Err(e) => {
                tracing::warn!(raum = %raum_name, abonnent = %abonnent, fehler = %e, "Abonnieren fehlgeschlagen");
                raum.abonnent_entfernen(&abonnent);
                verbindung.schliessen().await;
                Err(e)
            }
        }
    }

    async fn abonnent_einrichten(
        &self,
        raum: &Arc<Raum>,
        abonnent: &TeilnehmerId,
        verbindung: &Arc<dyn PeerVerbindung>,
        video_codec: CodecInfo,
        angebot: &str,
        abbruch: CancellationToken,
    ) -> Result<String> {
        let audio_codec = raum.audio_codec().unwrap_or_else(CodecInfo::opus);
        let video = verbindung
            .lokalen_track_anlegen(MedienArt::Video, video_codec)
            .map_err(transport_fehler)?;
        let audio = verbindung
            .lokalen_track_anlegen(MedienArt::Audio, audio_codec)
            .map_err(transport_fehler)?;
        let ereignisse = verbindung
            .ereignisse_abholen()
            .ok_or_else(|| RaumfunkError::intern("Ereignisstrom bereits abgeholt"))?;
        let antwort = verbindung
            .aushandeln(angebot)
            .await
            .map_err(transport_fehler)?;

        raum.abonnent_sinks_registrieren(abonnent, video.sink, audio.sink);
        // Publisher kann waehrend der Aushandlung weggefallen sein
        if raum.ist_abgebaut() {
            return Err(RaumfunkError::RaumNichtGefunden(raum.name().to_string()));
        }

        kontrolle_leeren(raum.name(), abonnent.as_str(), video.kontrolle, abbruch.clone());
        kontrolle_leeren(raum.name(), abonnent.as_str(), audio.kontrolle, abbruch.clone());
        tokio::spawn(self.clone().abonnent_ereignisse(
            Arc::clone(raum),
            abonnent.clone(),
            ereignisse,
            abbruch,
        ));
        Ok(antwort)
    }

    async fn abonnent_ereignisse(
        self,
        raum: Arc<Raum>,
        abonnent: TeilnehmerId,
        mut ereignisse: mpsc::Receiver<VerbindungsEreignis>,
        abbruch: CancellationToken,
    ) {
        loop {
            let ereignis = tokio::select! {
                _ = abbruch.cancelled() => return,
                e = ereignisse.recv() => e,
            };
            match ereignis {
                Some(VerbindungsEreignis::Track(track)) => {
                    if track.codec().medien_art() == MedienArt::Audio {
                        tokio::spawn(mikrofon_schleife(
                            Arc::clone(&raum),
                            abonnent.clone(),
                            track,
                            abbruch.clone(),
                        ));
                    } else {
                        tracing::debug!(raum = %raum.name(), abonnent = %abonnent, "Video vom Abonnenten ignoriert");
                    }
                }
                Some(VerbindungsEreignis::Zustand(zustand)) => {
                    tracing::info!(raum = %raum.name(), abonnent = %abonnent, ?zustand, "Abonnenten-Zustand");
                    if zustand.ist_beendet() {
                        break;
                    }
                }
                None => break,
            }
        }
        self.abonnent_abmelden(&raum, &abonnent).await;
    }

    /// Entfernt genau diesen Abonnenten aus dem Raum
    pub async fn abonnent_abmelden(&self, raum: &Raum, abonnent: &TeilnehmerId) {
        if let Some(verbindung) = raum.abonnent_entfernen(abonnent) {
            verbindung.schliessen().await;
            tracing::info!(raum = %raum.name(), abonnent = %abonnent, "Abonnent entfernt");
        }
    }

    // -----------------------------------------------------------------------
    // Dateien
    // -----------------------------------------------------------------------

    /// Spielt eine Audiodatei in den Raum ein
    ///
    /// Kehrt sofort zurueck. Ohne Publisher oder bei bereits laufender
    /// Datei passiert nichts.
    pub fn datei_abspielen(&self, raum_name: &str, pfad: impl Into<PathBuf>) -> Result<()> {
        let raum = self.raum_holen(raum_name)?;
        let Some(ausgang) = raum.ausgang() else {
            tracing::info!(raum = %raum_name, "Kein Publisher, Datei wird nicht abgespielt");
            return Ok(());
        };
        let _ = self.inner.einspeiser.starten(
            raum_name,
            pfad.into(),
            ausgang,
            raum.spielt_datei(),
            raum.abbruch(),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Befehle
    // -----------------------------------------------------------------------

    /// Fuehrt einen Signalisierungsbefehl aus
    pub async fn befehl_ausfuehren(&self, befehl: Befehl) -> Antwort {
        if let Err(e) = befehl.validieren() {
            return Antwort::ungueltig(&e);
        }

        let ergebnis = match befehl {
            Befehl::Create { room_name, sdp } => self.erstellen_und_veroeffentlichen(&room_name, &sdp).await,
            Befehl::Join {
                room_name,
                user_id,
                sdp,
            } => self
                .abonnieren(&room_name, TeilnehmerId::neu(user_id), &sdp)
                .await
                .map(|sdp| Antwort::Answer { sdp }),
            Befehl::Play { room_name, path } => {
                self.datei_abspielen(&room_name, path).map(|()| Antwort::Ok)
            }
            Befehl::List => Ok(Antwort::Rooms {
                rooms: self.raeume_auflisten(),
            }),
        };

        ergebnis.unwrap_or_else(|e| Antwort::fehler(&e))
    }

    async fn erstellen_und_veroeffentlichen(&self, raum_name: &str, angebot: &str) -> Result<Antwort> {
        let raum = self.raum_erstellen(raum_name)?;
        match self.veroeffentlichen(raum_name, angebot).await {
            Ok(sdp) => Ok(Antwort::Answer { sdp }),
            Err(e) => {
                self.raum_abbauen(&raum).await;
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Paket-Schleifen
// ---------------------------------------------------------------------------

/// Liest einen Publisher-Track und verteilt jedes Paket
async fn eingangs_schleife(
    router: PaketRouter,
    raum: Arc<Raum>,
    track: Arc<dyn TrackLeser>,
    art: MedienArt,
) {
    let abbruch = raum.abbruch();
    let mut gelesen = 0u64;

    loop {
        let ergebnis = tokio::select! {
            _ = abbruch.cancelled() => break,
            r = track.lesen() => r,
        };
        let (paket, kontrolle) = match ergebnis {
            Ok(p) => p,
            Err(e) => {
                lesefehler_loggen(raum.name(), &e);
                break;
            }
        };
        if kontrolle {
            continue;
        }
        gelesen += 1;

        match art {
            MedienArt::Video => {
                router.weiterleiten(&paket, raum.video_sinks()).await;
                if let Some(schnappschuss) = raum.schnappschuss() {
                    schnappschuss.anbieten(paket.clone());
                }
                if let Some(aufnahme) = raum.aufnahme() {
                    aufnahme.anbieten(AufnahmePaket::Video(paket));
                }
            }
            MedienArt::Audio => {
                router.weiterleiten(&paket, raum.audio_sinks()).await;
                if let Some(aufnahme) = raum.aufnahme() {
                    aufnahme.anbieten(AufnahmePaket::Audio(paket));
                }
            }
        }
    }

    tracing::debug!(raum = %raum.name(), ?art, gelesen, "Eingangs-Task beendet");
}

/// Reicht das Mikrofon eines Abonnenten an den Ausgangskanal weiter
///
/// Solange eine Datei laeuft, werden Mikrofonpakete verworfen.
async fn mikrofon_schleife(
    raum: Arc<Raum>,
    abonnent: TeilnehmerId,
    track: Arc<dyn TrackLeser>,
    abbruch: CancellationToken,
) {
    let spielt = raum.spielt_datei();

    loop {
        let ergebnis = tokio::select! {
            _ = abbruch.cancelled() => break,
            r = track.lesen() => r,
        };
        let (paket, kontrolle) = match ergebnis {
            Ok(p) => p,
            Err(e) => {
                lesefehler_loggen(raum.name(), &e);
                break;
            }
        };
        if kontrolle || spielt.load(Ordering::SeqCst) {
            continue;
        }
        let Some(ausgang) = raum.ausgang() else {
            break;
        };

        let eintrag = AusgangsPaket {
            quelle: Quelle::Mikrofon,
            paket,
        };
        let gesendet = tokio::select! {
            _ = abbruch.cancelled() => break,
            r = ausgang.send(eintrag) => r,
        };
        if gesendet.is_err() {
            break;
        }
    }

    tracing::debug!(raum = %raum.name(), abonnent = %abonnent, "Mikrofon-Task beendet");
}

/// Leert den Kontrollkanal eines lokalen Tracks bis zum Fehler oder Abbruch
fn kontrolle_leeren(
    raum: &str,
    wer: &str,
    kontrolle: Box<dyn KontrollLeser>,
    abbruch: CancellationToken,
) {
    let raum = raum.to_string();
    let wer = wer.to_string();
    tokio::spawn(async move {
        loop {
            let ergebnis = tokio::select! {
                _ = abbruch.cancelled() => break,
                r = kontrolle.lesen() => r,
            };
            if let Err(e) = ergebnis {
                if !e.ist_geschlossen() {
                    tracing::debug!(raum = %raum, wer = %wer, fehler = %e, "Kontrollkanal beendet");
                }
                break;
            }
        }
    });
}

fn lesefehler_loggen(raum: &str, fehler: &TransportFehler) {
    if fehler.ist_geschlossen() {
        tracing::debug!(raum = %raum, "Track geschlossen");
    } else {
        tracing::warn!(raum = %raum, fehler = %fehler, "Lesefehler auf Track");
    }
}
