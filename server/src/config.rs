//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Context};
use onair_media::KurentoConfig;
use onair_observability::logging::{log_format_gueltig, log_level_gueltig};
use onair_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use onair_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    /// Listener fuer das WebSocket-Signaling
    pub netzwerk: NetzwerkEinstellungen,
    /// Verbindung zum Medien-Backend
    pub medien: MedienEinstellungen,
    /// Grenzen fuer Queues und Chat
    pub signaling: SignalingEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Metriken und Health-Check
    pub observability: ObservabilityEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers (nur fuer Logs)
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "onair".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer das WebSocket-Signaling
    pub signaling_port: u16,
    /// Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
    /// Maximale Groesse eines Textframes in Bytes
    pub max_frame_size: usize,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 8443,
            ws_pfad: "/signaling".into(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_verbindungen: 1024,
        }
    }
}

/// Medien-Backend (Kurento)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    /// WebSocket-URI des Media Servers
    pub kurento_uri: String,
    /// Zeitlimit fuer Verbindungsaufbau und einzelne Aufrufe in Sekunden
    pub zeitlimit_sek: u64,
}

impl Default for MedienEinstellungen {
    fn default() -> Self {
        Self {
            kurento_uri: "ws://localhost:8888/kurento".into(),
            zeitlimit_sek: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Maximal gepufferte ICE-Kandidaten pro Verbindung
    pub max_kandidaten: usize,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Gespeicherte Chat-Nachrichten pro Raum
    pub chat_kapazitaet: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            max_kandidaten: standard.max_kandidaten,
            send_queue_groesse: standard.send_queue_groesse,
            chat_kapazitaet: standard.chat_kapazitaet,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    ///
    /// Feinere Filter-Direktiven nur ueber `ONAIR_LOG_LEVEL`.
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    /// Port fuer `/metrics` und `/health`
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !self.netzwerk.ws_pfad.starts_with('/') {
            bail!("ws_pfad muss mit '/' beginnen: '{}'", self.netzwerk.ws_pfad);
        }
        if self.netzwerk.max_frame_size == 0 || self.signaling.send_queue_groesse == 0 {
            bail!("max_frame_size und send_queue_groesse muessen groesser als 0 sein");
        }
        if self.signaling.chat_kapazitaet == 0 {
            bail!("chat_kapazitaet muss groesser als 0 sein");
        }
        Ok(())
    }

    pub fn signaling_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.netzwerk.signaling_port)
    }

    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Konfiguration fuer den Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            ws_pfad: self.netzwerk.ws_pfad.clone(),
            max_verbindungen: self.netzwerk.max_verbindungen,
            max_frame_size: self.netzwerk.max_frame_size,
            send_queue_groesse: self.signaling.send_queue_groesse,
            max_kandidaten: self.signaling.max_kandidaten,
            chat_kapazitaet: self.signaling.chat_kapazitaet,
        }
    }

    pub fn kurento_config(&self) -> KurentoConfig {
        KurentoConfig {
            uri: self.medien.kurento_uri.clone(),
            zeitlimit: Duration::from_secs(self.medien.zeitlimit_sek),
        }
    }
}

fn bind_adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.netzwerk.signaling_port, 8443);
        assert_eq!(cfg.netzwerk.ws_pfad, "/signaling");
        assert_eq!(cfg.medien.kurento_uri, "ws://localhost:8888/kurento");
        assert_eq!(cfg.signaling.chat_kapazitaet, 30);
        assert_eq!(cfg.signaling.max_kandidaten, 64);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(
            cfg.signaling_bind_adresse().unwrap(),
            "0.0.0.0:8443".parse().unwrap()
        );
        assert_eq!(
            cfg.observability_bind_adresse().unwrap(),
            "0.0.0.0:9300".parse().unwrap()
        );
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.signaling_bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            signaling_port = 9000

            [medien]
            kurento_uri = "ws://media:8888/kurento"
            zeitlimit_sek = 3

            [signaling]
            chat_kapazitaet = 50
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.netzwerk.signaling_port, 9000);
        assert_eq!(cfg.signaling.chat_kapazitaet, 50);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_pfad, "/signaling");
        assert_eq!(cfg.signaling.max_kandidaten, 64);

        let kurento = cfg.kurento_config();
        assert_eq!(kurento.uri, "ws://media:8888/kurento");
        assert_eq!(kurento.zeitlimit, Duration::from_secs(3));
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.max_verbindungen = 10;
        cfg.signaling.send_queue_groesse = 8;

        let sig = cfg.signaling_config();
        assert_eq!(sig.max_verbindungen, 10);
        assert_eq!(sig.send_queue_groesse, 8);
        assert_eq!(sig.chat_kapazitaet, 30);
    }

    #[test]
    fn validierung_lehnt_unsinn_ab() {
        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.ws_pfad = "signaling".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.signaling.chat_kapazitaet = 0;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn kaputtes_toml_ist_ein_fehler() {
        assert!(ServerConfig::aus_toml("[netzwerk\nport = ").is_err());
    }
}
