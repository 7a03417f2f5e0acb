//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Der Task liest
//! Textframes, dekodiert sie zu `ClientEvent`s, dispatcht an den
//! `EventRouter` und schreibt Antworten sowie Events aus der Send-Queue
//! zurueck auf den Socket.
//!
//! ## Fehlerverhalten
//! - Ungueltiges JSON, unbekannte Events oder zu grosse Frames: `error`-Event,
//!   die Verbindung bleibt offen
//! - Close-Frame, Lesefehler oder Shutdown: Schleife endet, die Session der
//!   Verbindung wird abgebaut

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use onair_core::ConnectionId;
use onair_protocol::{ServerEvent, TextCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::SignalingResult;
use crate::router::ConnectionContext;
use crate::server_state::SignalingState;

type WsSender = SplitSink<WebSocket, Message>;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    codec: TextCodec,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        let codec = TextCodec::with_max_size(state.config.max_frame_size);
        Self {
            state,
            peer_addr,
            codec,
        }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt oder ein Shutdown-Signal eingeht.
    pub async fn verarbeiten(self, socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        let connection_id = ConnectionId::new();
        let mut ctx = ConnectionContext::neu(connection_id);

        let mut ausgehend_rx = self.state.broadcaster.verbindung_registrieren(connection_id);
        self.state.metriken.connections.inc();
        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Neue Verbindung");

        let (mut sender, mut empfaenger) = socket.split();

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = empfaenger.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let antworten = match self.codec.decode(&text) {
                                Ok(event) => self.state.router.dispatch(event, &mut ctx).await,
                                Err(e) => {
                                    tracing::warn!(
                                        connection_id = %connection_id,
                                        fehler = %e,
                                        "Ungueltige Nachricht"
                                    );
                                    vec![ServerEvent::error(e.to_string())]
                                }
                            };
                            if let Err(e) = self.alle_senden(&mut sender, antworten).await {
                                tracing::warn!(
                                    connection_id = %connection_id,
                                    fehler = %e,
                                    "Senden fehlgeschlagen"
                                );
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            let fehler = ServerEvent::error("Binary frames are not supported");
                            if self.senden(&mut sender, &fehler).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(connection_id = %connection_id, "Verbindung vom Client getrennt");
                            break;
                        }
                        // Ping/Pong beantwortet axum selbst
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                fehler = %e,
                                "WebSocket-Lesefehler"
                            );
                            break;
                        }
                    }
                }

                // Events aus dem Broadcaster
                Some(event) = ausgehend_rx.recv() => {
                    if let Err(e) = self.senden(&mut sender, &event).await {
                        tracing::warn!(
                            connection_id = %connection_id,
                            fehler = %e,
                            "Broadcast-Senden fehlgeschlagen"
                        );
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %connection_id, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        self.state.router.verbindung_beendet(&ctx).await;
        self.state.metriken.connections.dec();
        tracing::info!(peer = %peer_addr, connection_id = %connection_id, "Verbindungs-Task beendet");
    }

    async fn senden(&self, sender: &mut WsSender, event: &ServerEvent) -> SignalingResult<()> {
        let text = self.codec.encode(event)?;
        sender.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn alle_senden(&self, sender: &mut WsSender, events: Vec<ServerEvent>) -> SignalingResult<()> {
        for event in &events {
            self.senden(sender, event).await?;
        }
        Ok(())
    }
}
