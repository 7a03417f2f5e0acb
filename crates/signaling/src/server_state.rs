//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Router und Broadcaster, die sicher zwischen tokio-Tasks geteilt
//! werden koennen. Registry und Controller gehoeren dem Router.

use onair_media::MediaGateway;
use onair_observability::OnairMetrics;
use onair_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::sync::Arc;

use crate::broadcast::{EventBroadcaster, STANDARD_SEND_QUEUE_GROESSE};
use crate::candidate_queue::STANDARD_MAX_KANDIDATEN;
use crate::chat::STANDARD_CHAT_KAPAZITAET;
use crate::room::RoomRegistry;
use crate::router::EventRouter;
use crate::session::SessionController;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Maximale Groesse eines Textframes in Bytes
    pub max_frame_size: usize,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximal gepufferte ICE-Kandidaten pro Verbindung
    pub max_kandidaten: usize,
    /// Kapazitaet des Chat-Verlaufs pro Raum
    pub chat_kapazitaet: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            ws_pfad: "/signaling".to_string(),
            max_verbindungen: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            send_queue_groesse: STANDARD_SEND_QUEUE_GROESSE,
            max_kandidaten: STANDARD_MAX_KANDIDATEN,
            chat_kapazitaet: STANDARD_CHAT_KAPAZITAET,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    pub router: EventRouter,
    pub broadcaster: EventBroadcaster,
    pub metriken: OnairMetrics,
}

impl SignalingState {
    /// Erstellt den Zustand und verdrahtet Controller und Router
    pub fn neu(
        config: SignalingConfig,
        gateway: Arc<dyn MediaGateway>,
        metriken: OnairMetrics,
    ) -> Arc<Self> {
        let registry = Arc::new(RoomRegistry::neu(
            config.max_kandidaten,
            config.chat_kapazitaet,
        ));
        let broadcaster = EventBroadcaster::neu(config.send_queue_groesse);
        let controller = SessionController::neu(
            registry,
            gateway,
            broadcaster.clone(),
            metriken.clone(),
        );
        let router = EventRouter::neu(controller, broadcaster.clone());

        Arc::new(Self {
            config: Arc::new(config),
            router,
            broadcaster,
            metriken,
        })
    }
}
