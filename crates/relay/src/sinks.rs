//! Register der Abonnenten-Sinks eines Raums
//!
//! Geordnet nach Registrierung, eindeutig nach Teilnehmer-ID. Der Router
//! arbeitet auf einer Momentaufnahme, Aenderungen waehrend einer
//! Weiterleitung wirken erst ab dem naechsten Paket.

use std::sync::Arc;

use parking_lot::RwLock;
use raumfunk_core::TeilnehmerId;

use crate::transport::PaketSink;

#[derive(Default)]
pub struct SinkRegister {
    eintraege: RwLock<Vec<(TeilnehmerId, Arc<dyn PaketSink>)>>,
}

impl SinkRegister {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt einen Sink an; `false` wenn die ID bereits vergeben ist
    pub fn registrieren(&self, id: TeilnehmerId, sink: Arc<dyn PaketSink>) -> bool {
        let mut eintraege = self.eintraege.write();
        if eintraege.iter().any(|(vorhanden, _)| *vorhanden == id) {
            return false;
        }
        eintraege.push((id, sink));
        true
    }

    pub fn entfernen(&self, id: &TeilnehmerId) -> bool {
        let mut eintraege = self.eintraege.write();
        let vorher = eintraege.len();
        eintraege.retain(|(vorhanden, _)| vorhanden != id);
        eintraege.len() != vorher
    }

    /// Sinks in Registrierungsreihenfolge zum Zeitpunkt des Aufrufs
    pub fn momentaufnahme(&self) -> Vec<Arc<dyn PaketSink>> {
        self.eintraege
            .read()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect()
    }

    pub fn enthaelt(&self, id: &TeilnehmerId) -> bool {
        self.eintraege.read().iter().any(|(vorhanden, _)| vorhanden == id)
    }

    pub fn ids(&self) -> Vec<TeilnehmerId> {
        self.eintraege.read().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.eintraege.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.read().is_empty()
    }

    pub fn leeren(&self) {
        self.eintraege.write().clear();
    }
}
