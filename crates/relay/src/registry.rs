//! Prozessweites Register der Raeume
//!
//! Wird explizit an die Konferenz uebergeben. Anlegen und Entfernen sind
//! exklusiv pro Name, Nachschlagen ist geteilt.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use raumfunk_core::{RaumfunkError, Result};
use raumfunk_protocol::RaumInfo;

use crate::raum::Raum;

#[derive(Default)]
pub struct RaumRegistry {
    raeume: DashMap<String, Arc<Raum>>,
}

impl RaumRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen Raum an; schlaegt fehl, wenn der Name vergeben ist
    pub fn erstellen(&self, name: &str) -> Result<Arc<Raum>> {
        match self.raeume.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RaumfunkError::RaumExistiert(name.to_string())),
            Entry::Vacant(frei) => {
                let raum = Arc::new(Raum::neu(name));
                frei.insert(Arc::clone(&raum));
                Ok(raum)
            }
        }
    }

    pub fn holen(&self, name: &str) -> Option<Arc<Raum>> {
        self.raeume.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Entfernt den Eintrag nur, wenn er noch auf genau diesen Raum zeigt
    ///
    /// Ein inzwischen neu angelegter Raum gleichen Namens bleibt stehen.
    pub fn entfernen_wenn(&self, name: &str, raum: &Arc<Raum>) -> bool {
        self.raeume
            .remove_if(name, |_, vorhanden| Arc::ptr_eq(vorhanden, raum))
            .is_some()
    }

    /// Alle Raeume, aelteste zuerst
    pub fn auflisten(&self) -> Vec<RaumInfo> {
        let mut infos: Vec<RaumInfo> = self.raeume.iter().map(|r| r.value().info()).collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        infos
    }

    pub fn len(&self) -> usize {
        self.raeume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raeume.is_empty()
    }
}
