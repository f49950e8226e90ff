//! Minimaler WebM-Leser zum Pruefen geschriebener Aufnahmen
//!
//! Versteht genau das, was [`super::WebmSchreiber`] erzeugt, plus Elemente
//! mit bekannter Groesse, die uebersprungen werden.

use std::path::Path;

use super::ebml;
use crate::error::{MedienFehler, MedienResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpurEintrag {
    pub nummer: u64,
    /// 1 = Video, 2 = Audio
    pub typ: u64,
    pub codec_id: String,
    pub standard_dauer_ns: Option<u64>,
    pub breite: Option<u32>,
    pub hoehe: Option<u32>,
    pub abtastrate: Option<f64>,
    pub kanaele: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub spur: u64,
    /// Absolute Zeit in ms
    pub zeit_ms: i64,
    pub keyframe: bool,
    pub daten: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebmDatei {
    pub timecode_scale: u64,
    pub spuren: Vec<SpurEintrag>,
    pub bloecke: Vec<Block>,
    pub cluster: usize,
}

impl WebmDatei {
    pub fn bloecke_der_spur(&self, spur: u64) -> impl Iterator<Item = &Block> {
        self.bloecke.iter().filter(move |b| b.spur == spur)
    }
}

pub fn lesen(pfad: impl AsRef<Path>) -> MedienResult<WebmDatei> {
    let daten = std::fs::read(pfad)?;
    aus_bytes(&daten)
}

struct Kopf {
    id: u32,
    groesse: Option<u64>,
    laenge: usize,
}

fn kopf_lesen(daten: &[u8]) -> MedienResult<Kopf> {
    let (id, id_laenge) =
        ebml::id_lesen(daten).ok_or_else(|| MedienFehler::container("ungueltige Element-ID"))?;
    let (groesse, groessen_laenge) = ebml::vint_lesen(&daten[id_laenge..])
        .ok_or_else(|| MedienFehler::container("ungueltige Elementgroesse"))?;
    Ok(Kopf {
        id,
        groesse,
        laenge: id_laenge + groessen_laenge,
    })
}

fn inhalt(daten: &[u8], kopf: &Kopf) -> MedienResult<usize> {
    let groesse = kopf
        .groesse
        .ok_or_else(|| MedienFehler::container(format!("unbekannte Groesse bei {:#x}", kopf.id)))?
        as usize;
    if daten.len() < kopf.laenge + groesse {
        return Err(MedienFehler::container(format!(
            "Element {:#x} abgeschnitten",
            kopf.id
        )));
    }
    Ok(groesse)
}

pub fn aus_bytes(daten: &[u8]) -> MedienResult<WebmDatei> {
    let mut datei = WebmDatei {
        timecode_scale: 1_000_000,
        ..Default::default()
    };

    let header = kopf_lesen(daten)?;
    if header.id != ebml::EBML {
        return Err(MedienFehler::container("kein EBML-Header"));
    }
    let mut pos = header.laenge + inhalt(daten, &header)?;

    let segment = kopf_lesen(&daten[pos..])?;
    if segment.id != ebml::SEGMENT {
        return Err(MedienFehler::container("kein Segment"));
    }
    pos += segment.laenge;
    let segment_ende = match segment.groesse {
        Some(g) => (pos + g as usize).min(daten.len()),
        None => daten.len(),
    };

    let mut cluster_zeit: i64 = 0;
    let mut im_cluster = false;

    while pos < segment_ende {
        let kopf = kopf_lesen(&daten[pos..segment_ende])?;
        match kopf.id {
            ebml::CLUSTER => {
                datei.cluster += 1;
                im_cluster = true;
                cluster_zeit = 0;
                pos += kopf.laenge;
                // Kinder werden in dieser Schleife gelesen
                continue;
            }
            ebml::TIMECODE if im_cluster => {
                let g = inhalt(&daten[pos..], &kopf)?;
                let start = pos + kopf.laenge;
                cluster_zeit = ebml::uint_lesen(&daten[start..start + g]) as i64;
            }
            ebml::SIMPLE_BLOCK if im_cluster => {
                let g = inhalt(&daten[pos..], &kopf)?;
                let start = pos + kopf.laenge;
                datei
                    .bloecke
                    .push(block_lesen(&daten[start..start + g], cluster_zeit)?);
            }
            ebml::INFO => {
                let g = inhalt(&daten[pos..], &kopf)?;
                let start = pos + kopf.laenge;
                info_lesen(&daten[start..start + g], &mut datei)?;
            }
            ebml::TRACKS => {
                let g = inhalt(&daten[pos..], &kopf)?;
                let start = pos + kopf.laenge;
                spuren_lesen(&daten[start..start + g], &mut datei)?;
            }
            _ => {}
        }
        pos += kopf.laenge + inhalt(&daten[pos..], &kopf)?;
    }

    Ok(datei)
}

/// Iteriert ueber die Kinder eines Master-Elements mit bekannter Groesse
fn kinder(daten: &[u8]) -> MedienResult<Vec<(u32, &[u8])>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < daten.len() {
        let kopf = kopf_lesen(&daten[pos..])?;
        let g = inhalt(&daten[pos..], &kopf)?;
        let start = pos + kopf.laenge;
        out.push((kopf.id, &daten[start..start + g]));
        pos = start + g;
    }
    Ok(out)
}

fn info_lesen(daten: &[u8], datei: &mut WebmDatei) -> MedienResult<()> {
    for (id, wert) in kinder(daten)? {
        if id == ebml::TIMECODE_SCALE {
            datei.timecode_scale = ebml::uint_lesen(wert);
        }
    }
    Ok(())
}

fn spuren_lesen(daten: &[u8], datei: &mut WebmDatei) -> MedienResult<()> {
    for (id, eintrag) in kinder(daten)? {
        if id != ebml::TRACK_ENTRY {
            continue;
        }
        let mut spur = SpurEintrag::default();
        for (id, wert) in kinder(eintrag)? {
            match id {
                ebml::TRACK_NUMBER => spur.nummer = ebml::uint_lesen(wert),
                ebml::TRACK_TYPE => spur.typ = ebml::uint_lesen(wert),
                ebml::CODEC_ID => spur.codec_id = String::from_utf8_lossy(wert).into_owned(),
                ebml::DEFAULT_DURATION => spur.standard_dauer_ns = Some(ebml::uint_lesen(wert)),
                ebml::VIDEO => {
                    for (id, wert) in kinder(wert)? {
                        match id {
                            ebml::PIXEL_WIDTH => spur.breite = Some(ebml::uint_lesen(wert) as u32),
                            ebml::PIXEL_HEIGHT => spur.hoehe = Some(ebml::uint_lesen(wert) as u32),
                            _ => {}
                        }
                    }
                }
                ebml::AUDIO => {
                    for (id, wert) in kinder(wert)? {
                        match id {
                            ebml::SAMPLING_FREQUENCY => spur.abtastrate = ebml::float_lesen(wert),
                            ebml::CHANNELS => spur.kanaele = Some(ebml::uint_lesen(wert)),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        datei.spuren.push(spur);
    }
    Ok(())
}

fn block_lesen(daten: &[u8], cluster_zeit: i64) -> MedienResult<Block> {
    let (spur, laenge) = ebml::vint_lesen(daten)
        .and_then(|(s, l)| s.map(|s| (s, l)))
        .ok_or_else(|| MedienFehler::container("ungueltige Spurnummer im Block"))?;
    if daten.len() < laenge + 3 {
        return Err(MedienFehler::container("Block zu kurz"));
    }
    let relativ = i16::from_be_bytes([daten[laenge], daten[laenge + 1]]) as i64;
    let flags = daten[laenge + 2];
    Ok(Block {
        spur,
        zeit_ms: cluster_zeit + relativ,
        keyframe: flags & 0x80 != 0,
        daten: daten[laenge + 3..].to_vec(),
    })
}
