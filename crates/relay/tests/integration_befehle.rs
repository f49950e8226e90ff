//! Integrationstests fuer die Befehlsausfuehrung an der Signalisierungsgrenze

mod common;

use std::sync::Arc;

use common::FakeFabrik;
use raumfunk_protocol::{Antwort, Befehl, ErrorCode};
use raumfunk_relay::{Konferenz, RaumRegistry, RelayKonfig};

fn konferenz() -> (Konferenz, Arc<FakeFabrik>) {
    let fabrik = Arc::new(FakeFabrik::default());
    let konferenz = Konferenz::neu(
        Arc::new(RaumRegistry::neu()),
        fabrik.clone(),
        RelayKonfig::default(),
    );
    (konferenz, fabrik)
}

fn create(raum: &str) -> Befehl {
    Befehl::Create {
        room_name: raum.into(),
        sdp: format!("offer-{raum}"),
    }
}

fn fehlercode(antwort: &Antwort) -> ErrorCode {
    match antwort {
        Antwort::Error { code, .. } => *code,
        andere => panic!("Fehlerantwort erwartet, erhalten: {andere:?}"),
    }
}

#[tokio::test]
async fn test_create_liefert_antwort() {
    let (konferenz, _fabrik) = konferenz();
    let antwort = konferenz.befehl_ausfuehren(create("r1")).await;
    assert_eq!(
        antwort,
        Antwort::Answer {
            sdp: "answer:offer-r1".into()
        }
    );
}

#[tokio::test]
async fn test_create_doppelt() {
    let (konferenz, _fabrik) = konferenz();
    konferenz.befehl_ausfuehren(create("r1")).await;
    let antwort = konferenz.befehl_ausfuehren(create("r1")).await;
    assert_eq!(fehlercode(&antwort), ErrorCode::RoomExists);
}

#[tokio::test]
async fn test_create_mit_gescheiterter_aushandlung_hinterlaesst_keinen_raum() {
    let (konferenz, fabrik) = konferenz();
    fabrik.aushandlung_scheitern_lassen(true);

    let antwort = konferenz.befehl_ausfuehren(create("r1")).await;
    assert_eq!(fehlercode(&antwort), ErrorCode::TransportError);
    assert!(konferenz.registry().is_empty());
    assert!(fabrik.verbindung(0).ist_geschlossen());

    // Name ist wieder frei
    fabrik.aushandlung_scheitern_lassen(false);
    assert!(!konferenz.befehl_ausfuehren(create("r1")).await.ist_fehler());
}

#[tokio::test]
async fn test_join_fehlercodes() {
    let (konferenz, _fabrik) = konferenz();
    let join = |raum: &str| Befehl::Join {
        room_name: raum.into(),
        user_id: "u1".into(),
        sdp: "offer".into(),
    };

    let antwort = konferenz.befehl_ausfuehren(join("fehlt")).await;
    assert_eq!(fehlercode(&antwort), ErrorCode::NoSuchRoom);

    konferenz.befehl_ausfuehren(create("r1")).await;
    let antwort = konferenz.befehl_ausfuehren(join("r1")).await;
    assert_eq!(fehlercode(&antwort), ErrorCode::PublisherNotReady);
}

#[tokio::test]
async fn test_list_und_play() {
    let (konferenz, _fabrik) = konferenz();
    for raum in ["r1", "r2"] {
        konferenz.befehl_ausfuehren(create(raum)).await;
    }

    let Antwort::Rooms { rooms } = konferenz.befehl_ausfuehren(Befehl::List).await else {
        panic!("Raumliste erwartet");
    };
    let mut namen: Vec<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
    namen.sort_unstable();
    assert_eq!(namen, vec!["r1", "r2"]);

    let play = |raum: &str| Befehl::Play {
        room_name: raum.into(),
        path: "/tmp/nicht-da.ogg".into(),
    };
    assert_eq!(fehlercode(&konferenz.befehl_ausfuehren(play("fehlt")).await), ErrorCode::NoSuchRoom);
    // Abspielen ist fire-and-forget
    assert_eq!(konferenz.befehl_ausfuehren(play("r1")).await, Antwort::Ok);
}

#[tokio::test]
async fn test_ungueltige_befehle() {
    let (konferenz, _fabrik) = konferenz();
    let leer = Befehl::Create {
        room_name: " ".into(),
        sdp: "offer".into(),
    };
    assert_eq!(
        fehlercode(&konferenz.befehl_ausfuehren(leer).await),
        ErrorCode::InvalidRequest
    );

    let mit_pfad = Befehl::Create {
        room_name: "a/b".into(),
        sdp: "offer".into(),
    };
    assert_eq!(
        fehlercode(&konferenz.befehl_ausfuehren(mit_pfad).await),
        ErrorCode::InvalidRequest
    );
    assert!(konferenz.registry().is_empty());
}
