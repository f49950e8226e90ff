//! Paket-Router – Fan-out eines eingehenden Pakets an alle Sinks
//!
//! Schreibt nacheinander in Registrierungsreihenfolge. Ein bereits
//! abgebauter Sink wird still uebergangen, andere Schreibfehler werden
//! geloggt und betreffen nur dieses eine Paket. Ein Fehler entfernt nie
//! einen Sink aus dem Register.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use raumfunk_protocol::RtpPacket;

use crate::sinks::SinkRegister;

/// Zaehler des Routers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStatistik {
    pub weitergeleitet: u64,
    pub geschlossen: u64,
    pub fehler: u64,
}

#[derive(Clone, Default)]
pub struct PaketRouter {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    weitergeleitet: AtomicU64,
    geschlossen: AtomicU64,
    fehler: AtomicU64,
}

impl PaketRouter {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Leitet ein Paket an alle aktuell registrierten Sinks weiter
    ///
    /// Gibt die Anzahl erfolgreicher Schreibzugriffe zurueck.
    pub async fn weiterleiten(&self, paket: &RtpPacket, sinks: &SinkRegister) -> usize {
        let mut erfolgreich = 0usize;

        for sink in sinks.momentaufnahme() {
            match sink.schreiben(paket).await {
                Ok(()) => erfolgreich += 1,
                Err(e) if e.ist_geschlossen() => {
                    self.inner.geschlossen.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.inner.fehler.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        sequenz = paket.header.sequence_number,
                        fehler = %e,
                        "Weiterleitung an Sink fehlgeschlagen"
                    );
                }
            }
        }

        self.inner
            .weitergeleitet
            .fetch_add(erfolgreich as u64, Ordering::Relaxed);
        erfolgreich
    }

    pub fn statistik(&self) -> RouterStatistik {
        RouterStatistik {
            weitergeleitet: self.inner.weitergeleitet.load(Ordering::Relaxed),
            geschlossen: self.inner.geschlossen.load(Ordering::Relaxed),
            fehler: self.inner.fehler.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PaketSink, TransportFehler};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use raumfunk_core::TeilnehmerId;

    #[derive(Default)]
    struct SammelSink {
        pakete: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl PaketSink for SammelSink {
        async fn schreiben(&self, paket: &RtpPacket) -> Result<(), TransportFehler> {
            self.pakete.lock().push(paket.header.sequence_number);
            Ok(())
        }
    }

    struct FehlerSink(fn() -> TransportFehler);

    #[async_trait]
    impl PaketSink for FehlerSink {
        async fn schreiben(&self, _paket: &RtpPacket) -> Result<(), TransportFehler> {
            Err((self.0)())
        }
    }

    fn paket(seq: u16) -> RtpPacket {
        raumfunk_protocol::rtp_paket(96, seq, seq as u32 * 3000, 1, true, vec![seq as u8])
    }

    #[tokio::test]
    async fn jedes_paket_erreicht_jeden_sink_genau_einmal() {
        const N: usize = 5;
        const M: u16 = 40;
        let router = PaketRouter::neu();
        let register = SinkRegister::neu();
        let sinks: Vec<Arc<SammelSink>> = (0..N).map(|_| Arc::new(SammelSink::default())).collect();
        for (i, s) in sinks.iter().enumerate() {
            register.registrieren(TeilnehmerId::neu(format!("u{i}")), s.clone());
        }

        for seq in 0..M {
            assert_eq!(router.weiterleiten(&paket(seq), &register).await, N);
        }

        let erwartet: Vec<u16> = (0..M).collect();
        for s in &sinks {
            assert_eq!(*s.pakete.lock(), erwartet);
        }
        assert_eq!(router.statistik().weitergeleitet, (N * M as usize) as u64);
    }

    #[tokio::test]
    async fn spaet_registrierter_sink_bekommt_nur_spaetere_pakete() {
        let router = PaketRouter::neu();
        let register = SinkRegister::neu();
        let frueh = Arc::new(SammelSink::default());
        let spaet = Arc::new(SammelSink::default());

        register.registrieren(TeilnehmerId::neu("frueh"), frueh.clone());
        router.weiterleiten(&paket(1), &register).await;
        register.registrieren(TeilnehmerId::neu("spaet"), spaet.clone());
        router.weiterleiten(&paket(2), &register).await;

        assert_eq!(*frueh.pakete.lock(), vec![1, 2]);
        assert_eq!(*spaet.pakete.lock(), vec![2]);
    }

    #[tokio::test]
    async fn fehler_entfernen_keinen_sink() {
        let router = PaketRouter::neu();
        let register = SinkRegister::neu();
        let gut = Arc::new(SammelSink::default());

        register.registrieren(
            TeilnehmerId::neu("zu"),
            Arc::new(FehlerSink(|| TransportFehler::Geschlossen)),
        );
        register.registrieren(
            TeilnehmerId::neu("kaputt"),
            Arc::new(FehlerSink(|| TransportFehler::Io("broken pipe".into()))),
        );
        register.registrieren(TeilnehmerId::neu("gut"), gut.clone());

        assert_eq!(router.weiterleiten(&paket(7), &register).await, 1);
        assert_eq!(router.weiterleiten(&paket(8), &register).await, 1);

        assert_eq!(register.len(), 3);
        assert_eq!(*gut.pakete.lock(), vec![7, 8]);
        let stat = router.statistik();
        assert_eq!(stat.geschlossen, 2);
        assert_eq!(stat.fehler, 2);
    }
}
