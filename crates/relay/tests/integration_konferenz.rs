//! Integrationstests fuer Raeume, Publisher und Abonnenten

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{opus, vp8_interframe, vp8_keyframe, warten_bis, FakeFabrik};
use raumfunk_core::{CodecInfo, CodecTyp, MedienArt, RaumfunkError, TeilnehmerId, VerbindungsZustand};
use raumfunk_relay::{AufnahmeKonfig, Konferenz, RaumRegistry, RelayKonfig};
use tokio::sync::mpsc;

fn konferenz(konfig: RelayKonfig) -> (Konferenz, Arc<FakeFabrik>) {
    let fabrik = Arc::new(FakeFabrik::default());
    let konferenz = Konferenz::neu(Arc::new(RaumRegistry::neu()), fabrik.clone(), konfig);
    (konferenz, fabrik)
}

/// Raum mit Publisher, dessen Video-Track bereits angekommen ist
async fn raum_mit_video(
    konferenz: &Konferenz,
    fabrik: &FakeFabrik,
) -> mpsc::Sender<raumfunk_protocol::RtpPacket> {
    konferenz.raum_erstellen("r1").unwrap();
    let antwort = konferenz.veroeffentlichen("r1", "offer-pub").await.unwrap();
    assert_eq!(antwort, "answer:offer-pub");

    let video = fabrik.verbindung(0).track_senden(CodecInfo::vp8()).await;
    let raum = konferenz.registry().holen("r1").unwrap();
    warten_bis(|| raum.video_codec().is_some()).await;
    video
}

#[tokio::test]
async fn test_abonnieren_vor_publisher_video() {
    let (konferenz, _fabrik) = konferenz(RelayKonfig::default());
    konferenz.raum_erstellen("r1").unwrap();
    konferenz.veroeffentlichen("r1", "offer").await.unwrap();

    let fehler = konferenz
        .abonnieren("r1", TeilnehmerId::neu("u1"), "offer-u1")
        .await
        .unwrap_err();
    assert!(matches!(fehler, RaumfunkError::PublisherNichtBereit(ref r) if r == "r1"));
    assert!(fehler.ist_wiederholbar());
}

#[tokio::test]
async fn test_publisher_fehlgeschlagen_entfernt_raum() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let _video = raum_mit_video(&konferenz, &fabrik).await;

    for id in ["u1", "u2"] {
        konferenz
            .abonnieren("r1", TeilnehmerId::neu(id), "offer")
            .await
            .unwrap();
    }
    let raum = konferenz.registry().holen("r1").unwrap();
    assert_eq!(raum.abonnenten_anzahl(), 2);

    fabrik
        .verbindung(0)
        .zustand(VerbindungsZustand::Fehlgeschlagen)
        .await;
    warten_bis(|| konferenz.registry().holen("r1").is_none()).await;
    warten_bis(|| fabrik.verbindung(2).ist_geschlossen()).await;

    assert!(raum.ist_abgebaut());
    assert!(raum.ausgang().is_none());
    for n in 0..3 {
        assert!(fabrik.verbindung(n).ist_geschlossen());
    }

    let fehler = konferenz
        .abonnieren("r1", TeilnehmerId::neu("u3"), "offer")
        .await
        .unwrap_err();
    assert!(matches!(fehler, RaumfunkError::RaumNichtGefunden(_)));
}

#[tokio::test]
async fn test_zweiter_publisher_wird_abgelehnt() {
    let (konferenz, _fabrik) = konferenz(RelayKonfig::default());
    konferenz.raum_erstellen("r1").unwrap();
    konferenz.veroeffentlichen("r1", "a").await.unwrap();
    assert!(matches!(
        konferenz.veroeffentlichen("r1", "b").await,
        Err(RaumfunkError::PublisherVorhanden(_))
    ));
    assert!(matches!(
        konferenz.veroeffentlichen("fehlt", "b").await,
        Err(RaumfunkError::RaumNichtGefunden(_))
    ));
}

#[tokio::test]
async fn test_doppelte_abonnent_id() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let _video = raum_mit_video(&konferenz, &fabrik).await;
    konferenz
        .abonnieren("r1", TeilnehmerId::neu("u1"), "o")
        .await
        .unwrap();
    let fehler = konferenz
        .abonnieren("r1", TeilnehmerId::neu("u1"), "o")
        .await
        .unwrap_err();
    assert!(matches!(fehler, RaumfunkError::AbonnentVorhanden { .. }));
}

#[tokio::test]
async fn test_video_erreicht_alle_abonnenten_in_reihenfolge() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let video = raum_mit_video(&konferenz, &fabrik).await;
    for id in ["u1", "u2"] {
        konferenz
            .abonnieren("r1", TeilnehmerId::neu(id), "o")
            .await
            .unwrap();
    }

    // Abonnenten bekommen den Codec des Publishers
    let sink_u1 = fabrik.verbindung(1).lokaler_sink(MedienArt::Video);
    let sink_u2 = fabrik.verbindung(2).lokaler_sink(MedienArt::Video);
    assert_eq!(fabrik.verbindung(1).lokaler_codec(MedienArt::Video).typ, CodecTyp::Vp8);
    assert_eq!(fabrik.verbindung(2).lokaler_codec(MedienArt::Audio).typ, CodecTyp::Opus);

    for seq in 100..120u16 {
        video
            .send(vp8_interframe(seq, seq as u32 * 3000))
            .await
            .unwrap();
    }
    warten_bis(|| sink_u1.anzahl() == 20 && sink_u2.anzahl() == 20).await;

    let erwartet: Vec<u16> = (100..120).collect();
    assert_eq!(sink_u1.sequenzen(), erwartet);
    assert_eq!(sink_u2.sequenzen(), erwartet);
    assert_eq!(konferenz.router_statistik().weitergeleitet, 40);
}

#[tokio::test]
async fn test_mikrofon_erreicht_publisher_mit_neuen_sequenzen() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let _video = raum_mit_video(&konferenz, &fabrik).await;
    konferenz
        .abonnieren("r1", TeilnehmerId::neu("u1"), "o")
        .await
        .unwrap();

    let mikro = fabrik.verbindung(1).track_senden(CodecInfo::opus()).await;
    for seq in 5000..5010u16 {
        mikro.send(opus(seq, 100)).await.unwrap();
    }

    let publisher_audio = fabrik.verbindung(0).lokaler_sink(MedienArt::Audio);
    warten_bis(|| publisher_audio.anzahl() == 10).await;

    assert_eq!(publisher_audio.sequenzen(), (1..=10).collect::<Vec<u16>>());
    assert!(publisher_audio
        .pakete()
        .iter()
        .all(|p| p.header.payload_type == 111));
}

#[tokio::test]
async fn test_mikrofon_pausiert_waehrend_datei() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let _video = raum_mit_video(&konferenz, &fabrik).await;
    konferenz
        .abonnieren("r1", TeilnehmerId::neu("u1"), "o")
        .await
        .unwrap();
    let raum = konferenz.registry().holen("r1").unwrap();
    let publisher_audio = fabrik.verbindung(0).lokaler_sink(MedienArt::Audio);

    raum.spielt_datei().store(true, Ordering::SeqCst);
    // Laufende Datei: zweiter Start wird still ignoriert
    konferenz.datei_abspielen("r1", "/tmp/egal.ogg").unwrap();
    assert!(raum.spielt_gerade_datei());

    let mikro = fabrik.verbindung(1).track_senden(CodecInfo::opus()).await;
    for seq in 0..5u16 {
        mikro.send(opus(seq, 111)).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(publisher_audio.anzahl(), 0);

    raum.spielt_datei().store(false, Ordering::SeqCst);
    for seq in 5..8u16 {
        mikro.send(opus(seq, 111)).await.unwrap();
    }
    warten_bis(|| publisher_audio.anzahl() == 3).await;
    assert_eq!(publisher_audio.sequenzen(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_abonnent_fehler_entfernt_nur_eigene_sinks() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let video = raum_mit_video(&konferenz, &fabrik).await;
    for id in ["u1", "u2"] {
        konferenz
            .abonnieren("r1", TeilnehmerId::neu(id), "o")
            .await
            .unwrap();
    }
    let raum = konferenz.registry().holen("r1").unwrap();

    fabrik
        .verbindung(1)
        .zustand(VerbindungsZustand::Fehlgeschlagen)
        .await;
    warten_bis(|| raum.abonnenten() == vec![TeilnehmerId::neu("u2")]).await;

    assert!(fabrik.verbindung(1).ist_geschlossen());
    assert!(!fabrik.verbindung(2).ist_geschlossen());
    assert!(konferenz.registry().holen("r1").is_some());
    assert_eq!(raum.audio_sinks().ids(), vec![TeilnehmerId::neu("u2")]);

    let sink_u2 = fabrik.verbindung(2).lokaler_sink(MedienArt::Video);
    video.send(vp8_interframe(1, 3000)).await.unwrap();
    warten_bis(|| sink_u2.anzahl() == 1).await;
    assert_eq!(fabrik.verbindung(1).lokaler_sink(MedienArt::Video).anzahl(), 0);
}

#[tokio::test]
async fn test_getrennter_abonnent_wird_entfernt() {
    let (konferenz, fabrik) = konferenz(RelayKonfig::default());
    let video = raum_mit_video(&konferenz, &fabrik).await;
    for id in ["u1", "u2"] {
        konferenz
            .abonnieren("r1", TeilnehmerId::neu(id), "o")
            .await
            .unwrap();
    }
    let raum = konferenz.registry().holen("r1").unwrap();

    fabrik.verbindung(2).zustand(VerbindungsZustand::Getrennt).await;
    warten_bis(|| raum.abonnenten() == vec![TeilnehmerId::neu("u1")]).await;

    warten_bis(|| fabrik.verbindung(2).ist_geschlossen()).await;
    assert!(!fabrik.verbindung(1).ist_geschlossen());
    assert_eq!(raum.abonnenten_anzahl(), 1);
    assert_eq!(raum.audio_sinks().ids(), vec![TeilnehmerId::neu("u1")]);

    let sink_u1 = fabrik.verbindung(1).lokaler_sink(MedienArt::Video);
    video.send(vp8_interframe(1, 3000)).await.unwrap();
    warten_bis(|| sink_u1.anzahl() == 1).await;
    assert_eq!(fabrik.verbindung(2).lokaler_sink(MedienArt::Video).anzahl(), 0);
}

#[tokio::test]
async fn test_aufnahme_endet_mit_raum() {
    let dir = tempfile::tempdir().unwrap();
    let konfig = RelayKonfig {
        aufnahme: Some(AufnahmeKonfig {
            verzeichnis: dir.path().to_path_buf(),
            audio_max_late: 10,
            video_max_late: 100,
            h264_ersatz_aufloesung: (1280, 720),
            kapazitaet: 64,
        }),
        ..Default::default()
    };
    let (konferenz, fabrik) = konferenz(konfig);
    let video = raum_mit_video(&konferenz, &fabrik).await;
    let raum = konferenz.registry().holen("r1").unwrap();
    warten_bis(|| raum.rekorder().is_some()).await;
    let rekorder = raum.rekorder().unwrap();

    video.send(vp8_keyframe(1, 0, 640, 360)).await.unwrap();
    for seq in 2..10u16 {
        video
            .send(vp8_interframe(seq, (seq as u32 - 1) * 3000))
            .await
            .unwrap();
    }
    warten_bis(|| !rekorder.dateien().is_empty()).await;

    fabrik.verbindung(0).zustand(VerbindungsZustand::Geschlossen).await;
    warten_bis(|| konferenz.registry().is_empty()).await;
    // Der Schreib-Thread schliesst die Datei nach dem Abbau
    warten_bis(|| rekorder.status() == raumfunk_media::RekorderStatus::Geschlossen).await;

    let dateien = rekorder.dateien();
    assert_eq!(dateien.len(), 1);
    let name = dateien[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("r1_"));
    assert!(name.ends_with("_640x360.webm"));

    let datei = raumfunk_media::webm::lesen(&dateien[0]).unwrap();
    assert!(datei.bloecke[0].keyframe);
}
