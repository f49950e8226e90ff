//! Schnappschuss-Pipeline: VP8-Keyframes -> PNG-Standbilder
//!
//! Erhaelt eine Kopie der eingehenden Publisher-Videopakete ueber einen
//! begrenzten Kanal. Ist der Kanal voll, wird das Paket fallen gelassen,
//! der Live-Pfad wartet nie auf diese Pipeline. Nur Keyframes werden
//! dekodiert, alles andere wird ungesehen verworfen. Dekodieren und
//! PNG-Kodierung laufen im Blocking-Pool.
//!
//! Dateiname: `{verzeichnis}/{raum}_{zeitstempel}.png`

use std::io::Cursor;
use std::path::PathBuf;

use raumfunk_protocol::RtpPacket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MedienFehler, MedienResult};
use crate::sample_builder::Zusammensetzer;

// ---------------------------------------------------------------------------
// Dekoder
// ---------------------------------------------------------------------------

/// Dekodiertes Einzelbild, 8 Bit pro Kanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rasterbild {
    pub breite: u32,
    pub hoehe: u32,
    /// true = RGBA, false = RGB
    pub alpha: bool,
    pub pixel: Vec<u8>,
}

/// Dekodiert ein komplettes Video-Frame zu einem Rasterbild
pub trait BildDekoder: Send {
    fn dekodieren(&mut self, frame: &[u8]) -> MedienResult<Rasterbild>;
}

/// VP8-Keyframe-Dekoder
///
/// Das Frame wird in einen minimalen RIFF/WEBP-Container gepackt und dann
/// vom WebP-Dekoder verarbeitet, der intern denselben VP8-Bitstrom liest.
#[derive(Debug, Default)]
pub struct Vp8Dekoder;

impl Vp8Dekoder {
    fn riff_verpacken(frame: &[u8]) -> Vec<u8> {
        let auffuellung = frame.len() % 2;
        let chunk_groesse = 8 + frame.len() + auffuellung;
        let mut riff = Vec::with_capacity(12 + chunk_groesse);
        riff.extend_from_slice(b"RIFF");
        riff.extend_from_slice(&((4 + chunk_groesse) as u32).to_le_bytes());
        riff.extend_from_slice(b"WEBP");
        riff.extend_from_slice(b"VP8 ");
        riff.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        riff.extend_from_slice(frame);
        if auffuellung == 1 {
            riff.push(0);
        }
        riff
    }
}

impl BildDekoder for Vp8Dekoder {
    fn dekodieren(&mut self, frame: &[u8]) -> MedienResult<Rasterbild> {
        let riff = Self::riff_verpacken(frame);
        let mut dekoder = image_webp::WebPDecoder::new(Cursor::new(riff))
            .map_err(|e| MedienFehler::Dekodierung(e.to_string()))?;
        let (breite, hoehe) = dekoder.dimensions();
        let groesse = dekoder
            .output_buffer_size()
            .ok_or_else(|| MedienFehler::Dekodierung("Bild zu gross".into()))?;
        let mut pixel = vec![0u8; groesse];
        dekoder
            .read_image(&mut pixel)
            .map_err(|e| MedienFehler::Dekodierung(e.to_string()))?;
        Ok(Rasterbild {
            breite,
            hoehe,
            alpha: dekoder.has_alpha(),
            pixel,
        })
    }
}

/// Kodiert ein Rasterbild als PNG
pub fn png_kodieren(bild: &Rasterbild) -> MedienResult<Vec<u8>> {
    let mut ausgabe = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut ausgabe, bild.breite, bild.hoehe);
        encoder.set_color(if bild.alpha {
            png::ColorType::Rgba
        } else {
            png::ColorType::Rgb
        });
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| MedienFehler::Kodierung(e.to_string()))?;
        writer
            .write_image_data(&bild.pixel)
            .map_err(|e| MedienFehler::Kodierung(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| MedienFehler::Kodierung(e.to_string()))?;
    }
    Ok(ausgabe)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchnappschussKonfig {
    pub verzeichnis: PathBuf,
    pub raum: String,
    /// Verspaetungsfenster (Pakete)
    pub max_late: u16,
    /// Kapazitaet des Uebergabekanals
    pub kapazitaet: usize,
}

impl SchnappschussKonfig {
    pub fn neu(verzeichnis: impl Into<PathBuf>, raum: impl Into<String>) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
            raum: raum.into(),
            max_late: 20,
            kapazitaet: 64,
        }
    }
}

/// Sendeseite der Schnappschuss-Pipeline
///
/// Wird die letzte Instanz fallen gelassen, beendet sich der Task.
#[derive(Clone)]
pub struct Schnappschuss {
    sender: mpsc::Sender<RtpPacket>,
}

impl Schnappschuss {
    /// Startet den Schnappschuss-Task
    pub fn starten(
        konfig: SchnappschussKonfig,
        dekoder: Box<dyn BildDekoder>,
    ) -> (Self, JoinHandle<u64>) {
        let (sender, empfaenger) = mpsc::channel(konfig.kapazitaet.max(1));
        let handle = tokio::spawn(schnappschuss_schleife(konfig, dekoder, empfaenger));
        (Self { sender }, handle)
    }

    /// Bietet ein Paket an; `false` wenn es verworfen wurde
    pub fn anbieten(&self, paket: RtpPacket) -> bool {
        match self.sender.try_send(paket) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Schnappschuss-Kanal voll, Paket verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Empfangsschleife; liefert die Anzahl geschriebener Bilder
async fn schnappschuss_schleife(
    konfig: SchnappschussKonfig,
    mut dekoder: Box<dyn BildDekoder>,
    mut empfaenger: mpsc::Receiver<RtpPacket>,
) -> u64 {
    let mut builder = Zusammensetzer::vp8(konfig.max_late);
    let mut geschrieben = 0;

    'empfang: while let Some(paket) = empfaenger.recv().await {
        builder.push(paket);
        while let Some(sample) = builder.pop() {
            if !sample.ist_keyframe {
                continue;
            }
            let frame = sample.daten;
            let ergebnis = tokio::task::spawn_blocking(move || {
                let png = dekoder.dekodieren(&frame).and_then(|bild| png_kodieren(&bild));
                (dekoder, png)
            })
            .await;
            let png = match ergebnis {
                Ok((zurueck, png)) => {
                    dekoder = zurueck;
                    png
                }
                Err(e) => {
                    tracing::error!(raum = %konfig.raum, fehler = %e, "Schnappschuss-Dekoder abgestuerzt");
                    break 'empfang;
                }
            };
            match png {
                Ok(png) => match bild_speichern(&konfig, png).await {
                    Ok(pfad) => {
                        geschrieben += 1;
                        tracing::debug!(raum = %konfig.raum, datei = %pfad.display(), "Schnappschuss gespeichert");
                    }
                    Err(e) => {
                        tracing::warn!(raum = %konfig.raum, fehler = %e, "Schnappschuss nicht gespeichert");
                    }
                },
                Err(e) => {
                    tracing::warn!(raum = %konfig.raum, fehler = %e, "Schnappschuss uebersprungen");
                }
            }
        }
    }

    tracing::debug!(raum = %konfig.raum, geschrieben, "Schnappschuss-Task beendet");
    geschrieben
}

async fn bild_speichern(konfig: &SchnappschussKonfig, png: Vec<u8>) -> MedienResult<PathBuf> {
    tokio::fs::create_dir_all(&konfig.verzeichnis).await?;
    let zeitstempel = chrono::Local::now().format("%Y%m%d-%H%M%S%.6f");
    let pfad = konfig
        .verzeichnis
        .join(format!("{}_{}.png", konfig.raum, zeitstempel));
    tokio::fs::write(&pfad, png).await?;
    Ok(pfad)
}
