//! Ausgehender Audiopfad zum Publisher
//!
//! Live-Mikrofon der Abonnenten und eingespielte Dateien landen in einem
//! begrenzten Kanal pro Raum. Genau ein Task leert ihn, vergibt fortlaufende
//! Sequenznummern, setzt den festen Payload-Typ und schreibt in den
//! gemeinsamen Audio-Sink des Publishers.

use std::sync::Arc;

use raumfunk_protocol::RtpPacket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::transport::PaketSink;

/// Herkunft eines ausgehenden Audiopakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quelle {
    Datei,
    Mikrofon,
}

#[derive(Debug, Clone)]
pub struct AusgangsPaket {
    pub quelle: Quelle,
    pub paket: RtpPacket,
}

// ---------------------------------------------------------------------------
// Sequenznummern
// ---------------------------------------------------------------------------

/// Vergibt streng fortlaufende 16-Bit-Sequenznummern, 0 wird uebersprungen
#[derive(Debug, Clone)]
pub struct SequenzUmschreiber {
    naechste: u16,
}

impl SequenzUmschreiber {
    pub fn neu(start: u16) -> Self {
        Self {
            naechste: if start == 0 { 1 } else { start },
        }
    }

    /// Naechste Sequenznummer
    pub fn vergeben(&mut self) -> u16 {
        let seq = self.naechste;
        self.naechste = match self.naechste.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        seq
    }

    /// Setzt Sequenznummer und Payload-Typ des Pakets
    pub fn umschreiben(&mut self, paket: &mut RtpPacket, payload_typ: u8) {
        paket.header.sequence_number = self.vergeben();
        paket.header.payload_type = payload_typ;
    }
}

// ---------------------------------------------------------------------------
// Konsument
// ---------------------------------------------------------------------------

/// Leert den Ausgangskanal eines Raums; liefert die Anzahl geschriebener Pakete
///
/// Endet, wenn alle Sender fallen gelassen wurden oder der Raum abgebaut
/// wird. Schreibfehler werden wie im Router behandelt.
pub async fn ausgangs_schleife(
    raum: String,
    mut empfaenger: mpsc::Receiver<AusgangsPaket>,
    sink: Arc<dyn PaketSink>,
    payload_typ: u8,
    start_sequenz: u16,
    abbruch: CancellationToken,
) -> u64 {
    let mut umschreiber = SequenzUmschreiber::neu(start_sequenz);
    let mut geschrieben = 0u64;

    loop {
        let eintrag = tokio::select! {
            _ = abbruch.cancelled() => break,
            e = empfaenger.recv() => e,
        };
        let Some(AusgangsPaket { quelle, mut paket }) = eintrag else {
            break;
        };

        umschreiber.umschreiben(&mut paket, payload_typ);
        match sink.schreiben(&paket).await {
            Ok(()) => {
                geschrieben += 1;
                tracing::trace!(
                    raum = %raum,
                    ?quelle,
                    sequenz = paket.header.sequence_number,
                    "Audio an Publisher"
                );
            }
            Err(e) if e.ist_geschlossen() => {}
            Err(e) => {
                tracing::warn!(raum = %raum, fehler = %e, "Audio an Publisher fehlgeschlagen");
            }
        }
    }

    tracing::debug!(raum = %raum, geschrieben, "Ausgangs-Task beendet");
    geschrieben
}
