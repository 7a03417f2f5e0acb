//! onair-server – Bibliotheks-Root
//!
//! Verdrahtet Medien-Gateway, Signaling-Service und Observability-Server.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use onair_media::{KurentoGateway, MediaGateway};
use onair_observability::{HealthState, OnairMetrics};
use onair_signaling::{SignalingServer, SignalingState};
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown_rx` auf `true` springt
    ///
    /// Reihenfolge:
    /// 1. Metriken und Kurento-Gateway anlegen (Verbindung erst beim ersten Aufruf)
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. WebSocket-Signaling starten
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let signaling_addr = self.config.signaling_bind_adresse()?;
        tracing::info!(
            server_name = %self.config.server.name,
            signaling = %signaling_addr,
            ws_pfad = %self.config.netzwerk.ws_pfad,
            kurento = %self.config.medien.kurento_uri,
            "Server startet"
        );

        let metriken = OnairMetrics::neu()?;
        let gateway = Arc::new(KurentoGateway::neu(self.config.kurento_config()));

        if self.config.observability.aktiviert {
            let addr = self.config.observability_bind_adresse()?;
            let check_gateway = Arc::clone(&gateway);
            let health = HealthState::neu(Arc::new(move || check_gateway.ist_erreichbar()));
            let obs_metriken = metriken.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    onair_observability::observability_server_starten(addr, obs_metriken, health)
                        .await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        let state = SignalingState::neu(
            self.config.signaling_config(),
            gateway as Arc<dyn MediaGateway>,
            metriken,
        );
        SignalingServer::neu(state, signaling_addr)
            .starten(shutdown_rx)
            .await
            .context("Signaling-Server")?;

        tracing::info!("Server beendet");
        Ok(())
    }
}
