//! Tests fuer Aushandlung, Kandidaten-Routing, Abbau und Router
//!
//! Alle Tests laufen gegen den `FakeGateway` aus `fake_gateway.rs`.

mod candidate_tests;
mod viewer_tests;

use onair_core::{ConnectionId, RoomName};
use onair_media::{EndpointId, MediaGateway};
use onair_observability::OnairMetrics;
use onair_protocol::ServerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::broadcast::EventBroadcaster;
use crate::room::RoomRegistry;
use crate::session::SessionController;

use fake_gateway::FakeGateway;

pub(crate) struct Aufbau {
    pub controller: SessionController,
    pub gateway: Arc<FakeGateway>,
    pub broadcaster: EventBroadcaster,
    pub registry: Arc<RoomRegistry>,
    pub metriken: OnairMetrics,
}

pub(crate) fn aufbau() -> Aufbau {
    let gateway = FakeGateway::neu();
    let registry = Arc::new(RoomRegistry::default());
    let broadcaster = EventBroadcaster::default();
    let metriken = OnairMetrics::neu().expect("Metriken");
    let controller = SessionController::neu(
        Arc::clone(&registry),
        Arc::clone(&gateway) as Arc<dyn MediaGateway>,
        broadcaster.clone(),
        metriken.clone(),
    );
    Aufbau {
        controller,
        gateway,
        broadcaster,
        registry,
        metriken,
    }
}

impl Aufbau {
    /// Presenter mit fertiger Aushandlung; gibt dessen Endpunkt zurueck
    pub async fn presenter(&self, conn: ConnectionId, room: &RoomName) -> EndpointId {
        self.controller
            .start_presenting(conn, room, "presenter-offer")
            .await
            .expect("Presenter muss akzeptiert werden");
        self.presenter_endpunkt(room).expect("Presenter-Endpunkt")
    }

    pub async fn viewer(&self, conn: ConnectionId, room: &RoomName) -> EndpointId {
        self.controller
            .start_viewing(conn, room, "viewer-offer")
            .await
            .expect("Viewer muss akzeptiert werden");
        self.registry
            .get(room)
            .and_then(|r| r.lock().viewer(&conn).and_then(|v| v.endpunkt_id().cloned()))
            .expect("Viewer-Endpunkt")
    }

    pub fn presenter_endpunkt(&self, room: &RoomName) -> Option<EndpointId> {
        self.registry
            .get(room)
            .and_then(|r| r.lock().presenter().and_then(|p| p.endpunkt_id().cloned()))
    }
}

pub(crate) fn raum(name: &str) -> RoomName {
    RoomName::from(name)
}

/// Wartet bis `bedingung` erfuellt ist (Hintergrund-Tasks laufen weiter)
pub(crate) async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    let ergebnis = tokio::time::timeout(Duration::from_secs(2), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(ergebnis.is_ok(), "Bedingung nicht innerhalb von 2s erfuellt");
}

/// Empfaengt das naechste Event einer Send-Queue
pub(crate) async fn empfangen(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Kein Event innerhalb von 2s")
        .expect("Send-Queue geschlossen")
}
