//! WebSocket-Listener – Bindet Socket, nimmt Upgrades an
//!
//! Der `SignalingServer` bindet einen TCP-Socket und bedient ihn mit einem
//! axum-Router. Jedes WebSocket-Upgrade auf dem konfigurierten Pfad startet
//! eine `ClientConnection` in einem eigenen Task.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::connection::ClientConnection;
use crate::server_state::SignalingState;

/// Zustand fuer den Upgrade-Handler
#[derive(Clone)]
struct HandlerZustand {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Baut den axum-Router mit dem WebSocket-Endpunkt
    pub fn router(&self, shutdown_rx: watch::Receiver<bool>) -> Router {
        let zustand = HandlerZustand {
            state: Arc::clone(&self.state),
            shutdown_rx,
        };
        Router::new()
            .route(&self.state.config.ws_pfad, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(zustand)
    }

    /// Startet den Listener
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt; offene
    /// Verbindungen werden dabei selbst geschlossen.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            pfad = %self.state.config.ws_pfad,
            "WebSocket Signaling-Server gestartet"
        );

        let router = self.router(shutdown_rx.clone());
        let mut signal = shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while signal.changed().await.is_ok() {
                if *signal.borrow() {
                    break;
                }
            }
            tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(zustand): State<HandlerZustand>,
) -> Response {
    let state = zustand.state;
    let aktuell = state.broadcaster.verbindung_anzahl();
    if aktuell >= state.config.max_verbindungen {
        tracing::warn!(
            peer = %peer_addr,
            max = state.config.max_verbindungen,
            "Server voll – Verbindung abgelehnt"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    tracing::debug!(peer = %peer_addr, "WebSocket-Upgrade angenommen");
    let shutdown_rx = zustand.shutdown_rx;
    ws.on_upgrade(move |socket| async move {
        ClientConnection::neu(state, peer_addr)
            .verarbeiten(socket, shutdown_rx)
            .await;
    })
}
