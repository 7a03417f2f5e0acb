//! onair Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use onair_observability::logging_initialisieren;
use onair_server::{config::ServerConfig, Server};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("ONAIR_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Standardwerte falls die Datei fehlt
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "onair Server wird initialisiert"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
            Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen"),
        }
        let _ = shutdown_tx.send(true);
    });

    Server::neu(config).starten(shutdown_rx).await
}
