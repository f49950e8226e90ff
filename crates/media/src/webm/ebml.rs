//! EBML-Grundbausteine: Element-IDs, variable Laengen, Elemente
//!
//! IDs werden samt Markierungsbit gespeichert (z.B. `0x1A45DFA3`) und so
//! kurz wie moeglich big-endian geschrieben.

// ---------------------------------------------------------------------------
// Element-IDs
// ---------------------------------------------------------------------------

pub const EBML: u32 = 0x1A45_DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

pub const SEGMENT: u32 = 0x1853_8067;
pub const INFO: u32 = 0x1549_A966;
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const NAME: u32 = 0x536E;
pub const DEFAULT_DURATION: u32 = 0x23_E383;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;

pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMECODE: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

/// Groessenangabe "unbekannt" (8 Byte, alle Datenbits gesetzt)
pub const UNBEKANNTE_GROESSE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

// ---------------------------------------------------------------------------
// Schreiben
// ---------------------------------------------------------------------------

pub fn id_schreiben(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(3);
    buf.extend_from_slice(&bytes[start..]);
}

/// Kodiert eine Laenge als EBML-VINT mit minimaler Breite
pub fn vint_schreiben(buf: &mut Vec<u8>, wert: u64) {
    let mut breite = 1;
    // Alle Datenbits gesetzt ist reserviert (unbekannte Groesse)
    while breite < 8 && wert >= (1u64 << (7 * breite)) - 1 {
        breite += 1;
    }
    let markiert = wert | (1u64 << (7 * breite));
    let bytes = markiert.to_be_bytes();
    buf.extend_from_slice(&bytes[8 - breite..]);
}

pub fn element(buf: &mut Vec<u8>, id: u32, inhalt: &[u8]) {
    id_schreiben(buf, id);
    vint_schreiben(buf, inhalt.len() as u64);
    buf.extend_from_slice(inhalt);
}

pub fn uint(buf: &mut Vec<u8>, id: u32, wert: u64) {
    let bytes = wert.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    element(buf, id, &bytes[start..]);
}

pub fn float(buf: &mut Vec<u8>, id: u32, wert: f64) {
    element(buf, id, &wert.to_be_bytes());
}

pub fn string(buf: &mut Vec<u8>, id: u32, wert: &str) {
    element(buf, id, wert.as_bytes());
}

/// Baut ein Master-Element aus einem Closure, das die Kinder schreibt
pub fn master(buf: &mut Vec<u8>, id: u32, kinder: impl FnOnce(&mut Vec<u8>)) {
    let mut inhalt = Vec::new();
    kinder(&mut inhalt);
    element(buf, id, &inhalt);
}

// ---------------------------------------------------------------------------
// Lesen
// ---------------------------------------------------------------------------

/// Liest eine Element-ID; liefert (ID, Laenge in Bytes)
pub fn id_lesen(daten: &[u8]) -> Option<(u32, usize)> {
    let erstes = *daten.first()?;
    let breite = erstes.leading_zeros() as usize + 1;
    if breite > 4 || daten.len() < breite {
        return None;
    }
    let id = daten[..breite]
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | *b as u32);
    Some((id, breite))
}

/// Liest eine Groessenangabe; `None` als Wert bedeutet "unbekannt"
pub fn vint_lesen(daten: &[u8]) -> Option<(Option<u64>, usize)> {
    let erstes = *daten.first()?;
    let breite = erstes.leading_zeros() as usize + 1;
    if breite > 8 || daten.len() < breite {
        return None;
    }
    let maske = if breite == 8 { 0 } else { 0xFFu8 >> breite };
    let mut wert = (erstes & maske) as u64;
    for b in &daten[1..breite] {
        wert = (wert << 8) | *b as u64;
    }
    let alle_bits = (1u64 << (7 * breite)) - 1;
    if wert == alle_bits {
        return Some((None, breite));
    }
    Some((Some(wert), breite))
}

pub fn uint_lesen(inhalt: &[u8]) -> u64 {
    inhalt.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

pub fn float_lesen(inhalt: &[u8]) -> Option<f64> {
    match inhalt.len() {
        4 => Some(f32::from_be_bytes(inhalt.try_into().ok()?) as f64),
        8 => Some(f64::from_be_bytes(inhalt.try_into().ok()?)),
        _ => None,
    }
}
