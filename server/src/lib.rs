//! raumfunk-server – Bibliotheks-Root
//!
//! Baut aus Konfiguration und Transport die Konferenz zusammen und stellt
//! die Signalisierungsgrenze bereit: JSON rein, JSON raus. Die eigentliche
//! Signalisierung (HTTP, WebSocket) und der Transport werden von aussen
//! eingesetzt.

pub mod config;
pub mod logging;

use std::sync::Arc;

use anyhow::Result;
use config::ServerConfig;
use raumfunk_protocol::{Antwort, Befehl};
use raumfunk_relay::{Konferenz, RaumRegistry, TransportFabrik};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    konferenz: Konferenz,
}

impl Server {
    /// Erstellt einen neuen Server aus Konfiguration und Transport
    pub fn neu(config: ServerConfig, fabrik: Arc<dyn TransportFabrik>) -> Self {
        let konferenz = Konferenz::neu(Arc::new(RaumRegistry::neu()), fabrik, config.relay_konfig());
        Self { config, konferenz }
    }

    /// Laedt die Konfiguration aus der Umgebung, initialisiert das Logging
    /// und baut den Server
    pub fn aus_umgebung(fabrik: Arc<dyn TransportFabrik>) -> Result<Self> {
        let config = ServerConfig::aus_umgebung()?;
        logging::logging_initialisieren(&config.logging.level, &config.logging.format);
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            server_name = %config.server.name,
            "Raumfunk Server wird initialisiert"
        );
        Ok(Self::neu(config, fabrik))
    }

    pub fn konferenz(&self) -> &Konferenz {
        &self.konferenz
    }

    /// Verarbeitet eine Signalisierungsnachricht
    ///
    /// Der Befehl wird hier genau einmal dekodiert und validiert.
    pub async fn nachricht_verarbeiten(&self, json: &str) -> Result<String> {
        let antwort = match Befehl::aus_json(json) {
            Ok(befehl) => {
                tracing::debug!(?befehl, "Befehl empfangen");
                self.konferenz.befehl_ausfuehren(befehl).await
            }
            Err(e) => {
                tracing::debug!(fehler = %e, "Ungueltige Nachricht");
                Antwort::ungueltig(&e)
            }
        };
        Ok(serde_json::to_string(&antwort)?)
    }

    /// Laeuft bis zum Shutdown-Signal und baut dann alle Raeume ab
    pub async fn starten(self) -> Result<()> {
        // Wirkungslos, wenn `aus_umgebung` das Logging schon eingerichtet hat
        logging::logging_initialisieren(&self.config.logging.level, &self.config.logging.format);
        let relay = self.config.relay_konfig();
        tracing::info!(
            server_name = %self.config.server.name,
            aufnahme = relay.aufnahme.is_some(),
            schnappschuss = relay.schnappschuss.is_some(),
            transcoder = %relay.einspeisung.programm,
            "Server startet"
        );

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Raeume werden abgebaut");

        self.konferenz.herunterfahren().await;
        Ok(())
    }
}
