//! Einspielen von Audiodateien in einen Raum
//!
//! Ein externer Transcoder (ffmpeg) liest die Datei in Echtzeit, kodiert sie
//! als Opus und schickt RTP an einen privaten Loopback-Port. Ein Lese-Task
//! reicht die Pakete in den Ausgangskanal des Raums weiter, solange das
//! Flag "spielt Datei" gesetzt ist. Das Flag pausiert gleichzeitig die
//! Weiterleitung der Live-Mikrofone.
//!
//! Die Einspeisung endet, wenn laenger als `leerlauf_timeout` kein Paket
//! kam. Beendet sich der Transcoder vorher, wird der Socket bis dahin noch
//! geleert. Danach wird das Flag geloescht.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use raumfunk_protocol::rtp;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ausgang::{AusgangsPaket, Quelle};
use crate::config::EinspeiserKonfig;

/// Maximale Groesse eines RTP-Datagramms vom Transcoder
const MAX_DATAGRAMM: usize = 1500;

/// Argumente fuer den Transcoder-Aufruf
pub fn transcoder_argumente(konfig: &EinspeiserKonfig, datei: &Path, port: u16) -> Vec<String> {
    vec![
        "-re".into(),
        "-i".into(),
        datei.to_string_lossy().into_owned(),
        "-f".into(),
        "rtp".into(),
        "-payload_type".into(),
        konfig.payload_typ.to_string(),
        "-acodec".into(),
        "libopus".into(),
        "-ar".into(),
        "48000".into(),
        "-ac".into(),
        "2".into(),
        "-b:a".into(),
        konfig.bitrate.clone(),
        "-frame_duration".into(),
        konfig.frame_dauer_ms.to_string(),
        "-max_muxing_queue_size".into(),
        "1024".into(),
        format!("rtp://127.0.0.1:{port}"),
    ]
}

/// Setzt das Flag beim Verlassen des Tasks zurueck
struct FlagWaechter(Arc<AtomicBool>);

impl Drop for FlagWaechter {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Warum die Empfangsschleife endete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmpfangsEnde {
    /// Laenger als das Timeout kein Paket
    Leerlauf,
    /// Ausgangskanal geschlossen (Raum abgebaut)
    KanalGeschlossen,
    /// Flag wurde von aussen geloescht
    Gestoppt,
    Fehler,
}

/// Liest RTP vom Loopback-Socket und reicht es in den Ausgangskanal
///
/// Das erste Paket darf `start_timeout` auf sich warten lassen, danach gilt
/// `leerlauf_timeout`. Liefert den Grund des Endes und die Anzahl
/// weitergereichter Pakete.
pub async fn empfangs_schleife(
    socket: &UdpSocket,
    ziel: &mpsc::Sender<AusgangsPaket>,
    spielt: &AtomicBool,
    start_timeout: Duration,
    leerlauf_timeout: Duration,
) -> (EmpfangsEnde, u64) {
    let mut puffer = [0u8; MAX_DATAGRAMM];
    let mut weitergereicht = 0u64;

    loop {
        let timeout = if weitergereicht == 0 {
            start_timeout
        } else {
            leerlauf_timeout
        };
        let laenge = match tokio::time::timeout(timeout, socket.recv(&mut puffer)).await {
            Err(_) => return (EmpfangsEnde::Leerlauf, weitergereicht),
            Ok(Err(e)) => {
                tracing::warn!(fehler = %e, "Lesefehler am Einspeise-Socket");
                return (EmpfangsEnde::Fehler, weitergereicht);
            }
            Ok(Ok(n)) => n,
        };

        if !spielt.load(Ordering::SeqCst) {
            return (EmpfangsEnde::Gestoppt, weitergereicht);
        }

        let paket = match rtp::dekodieren(&puffer[..laenge]) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(fehler = %e, "Ungueltiges RTP vom Transcoder");
                continue;
            }
        };

        let eintrag = AusgangsPaket {
            quelle: Quelle::Datei,
            paket,
        };
        if ziel.send(eintrag).await.is_err() {
            return (EmpfangsEnde::KanalGeschlossen, weitergereicht);
        }
        weitergereicht += 1;
    }
}

// ---------------------------------------------------------------------------
// DateiEinspeiser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DateiEinspeiser {
    konfig: EinspeiserKonfig,
}

impl DateiEinspeiser {
    pub fn neu(konfig: EinspeiserKonfig) -> Self {
        Self { konfig }
    }

    /// Startet die Einspeisung einer Datei
    ///
    /// Gibt `None` zurueck, wenn im Raum bereits eine Datei laeuft. Fehler
    /// beim Start des Transcoders werden nur geloggt.
    pub fn starten(
        &self,
        raum: &str,
        datei: PathBuf,
        ziel: mpsc::Sender<AusgangsPaket>,
        spielt: Arc<AtomicBool>,
        abbruch: CancellationToken,
    ) -> Option<JoinHandle<u64>> {
        if spielt
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!(raum = %raum, datei = %datei.display(), "Es laeuft bereits eine Datei");
            return None;
        }

        let konfig = self.konfig.clone();
        let raum = raum.to_string();
        let waechter = FlagWaechter(Arc::clone(&spielt));

        Some(tokio::spawn(async move {
            let _waechter = waechter;
            match einspeisen(&konfig, &raum, &datei, &ziel, &spielt, &abbruch).await {
                Ok(n) => {
                    tracing::info!(raum = %raum, datei = %datei.display(), pakete = n, "Einspeisung beendet");
                    n
                }
                Err(e) => {
                    tracing::warn!(raum = %raum, datei = %datei.display(), fehler = %e, "Einspeisung fehlgeschlagen");
                    0
                }
            }
        }))
    }
}

async fn einspeisen(
    konfig: &EinspeiserKonfig,
    raum: &str,
    datei: &Path,
    ziel: &mpsc::Sender<AusgangsPaket>,
    spielt: &AtomicBool,
    abbruch: &CancellationToken,
) -> std::io::Result<u64> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let port = socket.local_addr()?.port();

    let mut kind = Command::new(&konfig.programm)
        .args(transcoder_argumente(konfig, datei, port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    tracing::info!(raum = %raum, datei = %datei.display(), port, "Transcoder gestartet");

    let weitergereicht =
        weiterreichen(&socket, ziel, spielt, konfig, raum, kind.wait(), abbruch).await;

    // Laeuft der Transcoder noch, wird er beendet
    if let Ok(None) = kind.try_wait() {
        if let Err(e) = kind.kill().await {
            tracing::debug!(raum = %raum, fehler = %e, "Transcoder konnte nicht beendet werden");
        }
    }
    Ok(weitergereicht)
}

/// Reicht Pakete weiter, bis der Leser endet
///
/// Endet der Transcoder zuerst, liegen oft noch Datagramme im Socket. Die
/// Schleife liest dann weiter, bis das Leerlauf-Timeout greift.
async fn weiterreichen(
    socket: &UdpSocket,
    ziel: &mpsc::Sender<AusgangsPaket>,
    spielt: &AtomicBool,
    konfig: &EinspeiserKonfig,
    raum: &str,
    prozess_ende: impl Future<Output = std::io::Result<ExitStatus>>,
    abbruch: &CancellationToken,
) -> u64 {
    let leser = empfangs_schleife(
        socket,
        ziel,
        spielt,
        konfig.start_timeout,
        konfig.leerlauf_timeout,
    );
    tokio::pin!(leser);

    tokio::select! {
        (ende, n) = &mut leser => {
            tracing::debug!(raum = %raum, ?ende, "Einspeise-Leser beendet");
            return n;
        }
        status = prozess_ende => {
            tracing::debug!(raum = %raum, ?status, "Transcoder beendet, Socket wird geleert");
        }
        _ = abbruch.cancelled() => return 0,
    }

    tokio::select! {
        (ende, n) = &mut leser => {
            tracing::debug!(raum = %raum, ?ende, "Einspeise-Leser beendet");
            n
        }
        _ = abbruch.cancelled() => 0,
    }
}
