//! H.264-Zugriffseinheiten fuer die Aufnahme
//!
//! Eine Zugriffseinheit umfasst alle Pakete mit demselben RTP-Zeitstempel.
//! Pakete duerfen umsortiert eintreffen. Eine Einheit ist fertig, sobald
//! ihre Pakete lueckenlos vorliegen und direkt dahinter ein Paket mit neuem
//! Zeitstempel folgt. Luecken werden bis zum Verspaetungsfenster
//! abgewartet; danach wird die Einheit am Kopf verworfen.
//!
//! Pakete mit einem Zeitstempel, der nicht nach der zuletzt abgeschlossenen
//! Einheit liegt, gehoeren zu einer erledigten Einheit und werden
//! verworfen.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use raumfunk_protocol::codecs::{h264, Depacketizer, H264Packet};
use raumfunk_protocol::rtp::{seq_abstand, seq_vor, zeitstempel_vor};
use raumfunk_protocol::RtpPacket;

use crate::sample_builder::Sample;

/// 90-kHz-Videotakt
const TAKTRATE: u64 = 90_000;

pub struct ZugriffseinheitPuffer {
    max_late: u16,
    /// Wartende Pakete, nach Sequenznummer sortiert
    wartend: Vec<RtpPacket>,
    /// Erste Sequenznummer der naechsten Einheit
    erwartet: Option<u16>,
    /// Zeitstempel der zuletzt abgeschlossenen oder verworfenen Einheit
    grenze: Option<u32>,
    verworfen: u64,
}

impl ZugriffseinheitPuffer {
    pub fn neu(max_late: u16) -> Self {
        Self {
            max_late: max_late.max(1),
            wartend: Vec::new(),
            erwartet: None,
            grenze: None,
            verworfen: 0,
        }
    }

    /// Nimmt ein Paket auf und gibt alle dadurch fertigen Einheiten zurueck
    pub fn push(&mut self, paket: RtpPacket) -> Vec<Sample> {
        let seq = paket.header.sequence_number;
        let erledigt = self.erwartet.is_some_and(|e| seq_vor(seq, e))
            || self
                .grenze
                .is_some_and(|g| !zeitstempel_vor(g, paket.header.timestamp));
        if erledigt {
            tracing::trace!(sequenz = seq, "Nachzuegler einer erledigten Einheit verworfen");
            self.verworfen += 1;
            return Vec::new();
        }
        if self.wartend.iter().any(|p| p.header.sequence_number == seq) {
            return Vec::new();
        }

        self.wartend.push(paket);
        self.sortieren();

        let mut fertig = Vec::new();
        loop {
            if let Some(anzahl) = self.fertige_einheit() {
                let naechster = self.wartend.get(anzahl).map(|p| p.header.timestamp);
                let einheit: Vec<RtpPacket> = self.wartend.drain(..anzahl).collect();
                fertig.extend(self.ausgeben(einheit, naechster));
            } else if self.veraltet() {
                self.kopf_verwerfen();
            } else {
                break;
            }
        }
        fertig
    }

    fn sortieren(&mut self) {
        let basis = match self.erwartet {
            Some(e) => e,
            None => match self
                .wartend
                .iter()
                .map(|p| p.header.sequence_number)
                .reduce(|a, b| if seq_vor(b, a) { b } else { a })
            {
                Some(s) => s,
                None => return,
            },
        };
        self.wartend
            .sort_by_key(|p| seq_abstand(basis, p.header.sequence_number));
    }

    /// Laenge der Einheit am Kopf, falls sie lueckenlos abgeschlossen ist
    fn fertige_einheit(&self) -> Option<usize> {
        let kopf = self.wartend.first()?;
        if self
            .erwartet
            .is_some_and(|e| e != kopf.header.sequence_number)
        {
            return None;
        }
        let zeitstempel = kopf.header.timestamp;
        for (i, paar) in self.wartend.windows(2).enumerate() {
            if paar[1].header.sequence_number != paar[0].header.sequence_number.wrapping_add(1) {
                return None;
            }
            if paar[1].header.timestamp != zeitstempel {
                return Some(i + 1);
            }
        }
        None
    }

    /// Wartet der Kopf laenger als das Verspaetungsfenster?
    fn veraltet(&self) -> bool {
        let (Some(kopf), Some(ende)) = (self.wartend.first(), self.wartend.last()) else {
            return false;
        };
        let anfang = self.erwartet.unwrap_or(kopf.header.sequence_number);
        seq_abstand(anfang, ende.header.sequence_number) > self.max_late
    }

    /// Verwirft alle wartenden Pakete der Einheit am Kopf
    fn kopf_verwerfen(&mut self) {
        let Some(zeitstempel) = self.wartend.first().map(|p| p.header.timestamp) else {
            return;
        };
        let vorher = self.wartend.len();
        self.wartend.retain(|p| p.header.timestamp != zeitstempel);
        let anzahl = vorher - self.wartend.len();
        self.verworfen += anzahl as u64;
        tracing::debug!(zeitstempel, pakete = anzahl, "Zugriffseinheit unvollstaendig, verworfen");

        self.grenze = Some(zeitstempel);
        self.erwartet = self.wartend.first().map(|p| p.header.sequence_number);
    }

    /// Setzt eine Einheit zusammen; `naechster` ist der Zeitstempel der
    /// folgenden Einheit und bestimmt die Dauer
    fn ausgeben(&mut self, einheit: Vec<RtpPacket>, naechster: Option<u32>) -> Option<Sample> {
        let erstes = einheit.first()?;
        let letztes = einheit.last()?;
        let zeitstempel = erstes.header.timestamp;
        self.erwartet = Some(letztes.header.sequence_number.wrapping_add(1));
        self.grenze = Some(zeitstempel);

        let mut depacketizer = H264Packet::default();
        if !depacketizer.is_partition_head(&erstes.payload) {
            tracing::debug!(zeitstempel, "Zugriffseinheit ohne Anfang, verworfen");
            self.verworfen += einheit.len() as u64;
            return None;
        }

        let mut daten = BytesMut::new();
        for p in &einheit {
            match depacketizer.depacketize(&p.payload) {
                Ok(teil) => daten.extend_from_slice(&teil),
                Err(e) => tracing::debug!(fehler = %e, "H.264-Paket uebersprungen"),
            }
        }
        if daten.is_empty() {
            return None;
        }

        let dauer = match naechster {
            Some(danach) if zeitstempel_vor(zeitstempel, danach) => {
                let ticks = danach.wrapping_sub(zeitstempel) as u64;
                Duration::from_nanos(ticks * 1_000_000_000 / TAKTRATE)
            }
            _ => Duration::ZERO,
        };

        let daten: Bytes = daten.freeze();
        Some(Sample {
            ist_keyframe: h264::enthaelt_keyframe(&daten),
            daten,
            dauer,
            rtp_zeitstempel: zeitstempel,
        })
    }

    /// Gibt beim Schliessen aus, was lueckenlos vorliegt
    ///
    /// Die letzte Einheit gilt als fertig, wenn sie mit dem Marker-Bit
    /// endet.
    pub fn leeren(&mut self) -> Vec<Sample> {
        let mut fertig = Vec::new();
        while let Some(anzahl) = self.fertige_einheit() {
            let naechster = self.wartend.get(anzahl).map(|p| p.header.timestamp);
            let einheit: Vec<RtpPacket> = self.wartend.drain(..anzahl).collect();
            fertig.extend(self.ausgeben(einheit, naechster));
        }
        let rest = std::mem::take(&mut self.wartend);
        let lueckenlos = rest.windows(2).all(|w| {
            w[1].header.sequence_number == w[0].header.sequence_number.wrapping_add(1)
        });
        let anfang_passt = match (self.erwartet, rest.first()) {
            (Some(e), Some(p)) => e == p.header.sequence_number,
            _ => true,
        };
        if lueckenlos && anfang_passt && rest.last().is_some_and(|p| p.header.marker) {
            fertig.extend(self.ausgeben(rest, None));
        } else {
            self.verworfen += rest.len() as u64;
        }
        fertig
    }

    /// Anzahl verworfener Pakete
    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }
}
