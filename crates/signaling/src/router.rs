//! EventRouter – Routet ClientEvents an Raum, Chat und SessionController
//!
//! Jede Verbindung fuehrt einen `ConnectionContext` (Raum, Anzeigename), der
//! bei jedem Dispatch mitgegeben wird. Direkte Antworten gibt `dispatch`
//! zurueck; alles Asynchrone (Aushandlungen, Broadcasts) geht ueber den
//! `EventBroadcaster`.
//!
//! ## Aushandlungen
//! Queue-Reset und Slot-Reservierung fuer `presenter` und `viewer` laufen
//! direkt in `dispatch`, also vor jedem spaeteren Event derselben Verbindung.
//! Nur die Backend-Aufrufe laufen als eigener Task, damit die Verbindung
//! waehrenddessen weiter `onIceCandidate` und `stop` lesen kann. Die Antwort
//! (`presenterResponse`/`viewerResponse`) kommt ueber die Send-Queue.

use onair_core::{ConnectionId, RoomName};
use onair_protocol::{ChatMessage, ClientEvent, NegotiationResponse, ServerEvent};

use crate::broadcast::EventBroadcaster;
use crate::error::Rejection;
use crate::session::{Aushandlung, SessionController};

/// Zustand einer Verbindung, der zwischen Events erhalten bleibt
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    /// Raum nach `joinRoom`/`subscribeToStream`
    pub room: Option<RoomName>,
    /// Anzeigename fuer Chat-Nachrichten (leer wenn keiner angegeben)
    pub username: String,
}

impl ConnectionContext {
    pub fn neu(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            room: None,
            username: String::new(),
        }
    }
}

/// Zentraler Event-Router
#[derive(Clone)]
pub struct EventRouter {
    controller: SessionController,
    broadcaster: EventBroadcaster,
}

impl EventRouter {
    pub fn neu(controller: SessionController, broadcaster: EventBroadcaster) -> Self {
        Self {
            controller,
            broadcaster,
        }
    }

    /// Verarbeitet ein eingehendes Event und gibt die direkten Antworten zurueck
    pub async fn dispatch(
        &self,
        event: ClientEvent,
        ctx: &mut ConnectionContext,
    ) -> Vec<ServerEvent> {
        tracing::trace!(
            connection_id = %ctx.connection_id,
            event = event.name(),
            "Event empfangen"
        );

        match event {
            ClientEvent::JoinRoom { room, username } => {
                self.raum_betreten(ctx, RoomName::from(room), username).await;
                vec![ServerEvent::JoinedRoom]
            }

            ClientEvent::SubscribeToStream { room, username } => {
                let room = RoomName::from(room);
                self.raum_betreten(ctx, room.clone(), username).await;
                let mut antworten = vec![ServerEvent::JoinedRoom];
                if self.controller.presenter_aktiv(&room) {
                    antworten.push(ServerEvent::StreamStarted);
                }
                antworten
            }

            ClientEvent::Presenter { sdp_offer } => {
                let Some(room) = ctx.room.clone() else {
                    return vec![ServerEvent::PresenterResponse(
                        NegotiationResponse::rejected(Rejection::NotInRoom.to_string()),
                    )];
                };
                let connection_id = ctx.connection_id;
                let aushandlung = self.controller.presenter_vorbereiten(connection_id, &room);
                let router = self.clone();
                tokio::spawn(async move {
                    router
                        .presenter_aushandeln(connection_id, room, aushandlung, sdp_offer)
                        .await;
                });
                Vec::new()
            }

            ClientEvent::Viewer { sdp_offer } => {
                let Some(room) = ctx.room.clone() else {
                    return vec![ServerEvent::ViewerResponse(NegotiationResponse::rejected(
                        Rejection::NotInRoom.to_string(),
                    ))];
                };
                let connection_id = ctx.connection_id;
                let aushandlung = self.controller.viewer_vorbereiten(connection_id, &room);
                let router = self.clone();
                tokio::spawn(async move {
                    router
                        .viewer_aushandeln(connection_id, aushandlung, sdp_offer)
                        .await;
                });
                Vec::new()
            }

            ClientEvent::OnIceCandidate { candidate } => {
                self.controller
                    .on_ice_candidate(ctx.connection_id, ctx.room.as_ref(), candidate);
                Vec::new()
            }

            ClientEvent::Stop => {
                self.session_beenden(ctx).await;
                Vec::new()
            }

            ClientEvent::ChatNewMessage { text } => {
                let Some(room) = ctx.room.as_ref() else {
                    return vec![ServerEvent::error("Join a room before chatting")];
                };
                let nachricht = ChatMessage {
                    message: text,
                    username: ctx.username.clone(),
                };
                self.controller
                    .registry()
                    .get_or_create(room)
                    .lock()
                    .chat_mut()
                    .anhaengen(nachricht.clone());
                self.broadcaster
                    .an_raum_senden(room, ServerEvent::ChatNewMessage(nachricht));
                Vec::new()
            }

            ClientEvent::ChatLoadMessages => {
                let messages = match ctx.room.as_ref() {
                    Some(room) => self
                        .controller
                        .registry()
                        .get_or_create(room)
                        .lock()
                        .chat()
                        .nachrichten(),
                    None => Vec::new(),
                };
                vec![ServerEvent::ChatMessages { messages }]
            }
        }
    }

    /// Aufraeumen nach Verbindungsende (Close, Fehler, Shutdown)
    pub async fn verbindung_beendet(&self, ctx: &ConnectionContext) {
        self.session_beenden(ctx).await;
        self.broadcaster.verbindung_entfernen(&ctx.connection_id);
        tracing::debug!(connection_id = %ctx.connection_id, "Verbindung aufgeraeumt");
    }

    // -----------------------------------------------------------------------
    // Interne Helfer
    // -----------------------------------------------------------------------

    async fn raum_betreten(&self, ctx: &mut ConnectionContext, room: RoomName, username: String) {
        // Raumwechsel beendet die alte Session
        if let Some(alt) = ctx.room.as_ref().filter(|alt| **alt != room) {
            tracing::debug!(
                connection_id = %ctx.connection_id,
                von = %alt,
                nach = %room,
                "Raumwechsel"
            );
            self.controller.stop(ctx.connection_id, alt).await;
        }

        self.controller.registry().get_or_create(&room);
        self.broadcaster.raum_beitreten(ctx.connection_id, room.clone());
        tracing::info!(
            connection_id = %ctx.connection_id,
            room = %room,
            username = %username,
            "Raum betreten"
        );
        ctx.room = Some(room);
        ctx.username = username;
    }

    async fn session_beenden(&self, ctx: &ConnectionContext) {
        match ctx.room.as_ref() {
            Some(room) => self.controller.stop(ctx.connection_id, room).await,
            None => self
                .controller
                .registry()
                .kandidaten()
                .verwerfen(&ctx.connection_id),
        }
    }

    async fn presenter_aushandeln(
        &self,
        connection_id: ConnectionId,
        room: RoomName,
        aushandlung: Aushandlung,
        sdp_offer: String,
    ) {
        let antwort = match self.controller.aushandeln(aushandlung, &sdp_offer).await
        {
            Ok(sdp_answer) => {
                self.broadcaster
                    .an_raum_ausser_senden(&room, &connection_id, ServerEvent::StreamStarted);
                NegotiationResponse::accepted(sdp_answer)
            }
            Err(grund) => NegotiationResponse::rejected(grund.to_string()),
        };
        self.broadcaster
            .an_verbindung_senden(&connection_id, ServerEvent::PresenterResponse(antwort));
    }

    async fn viewer_aushandeln(
        &self,
        connection_id: ConnectionId,
        aushandlung: Aushandlung,
        sdp_offer: String,
    ) {
        let antwort = match self.controller.aushandeln(aushandlung, &sdp_offer).await
        {
            Ok(sdp_answer) => NegotiationResponse::accepted(sdp_answer),
            Err(grund) => NegotiationResponse::rejected(grund.to_string()),
        };
        self.broadcaster
            .an_verbindung_senden(&connection_id, ServerEvent::ViewerResponse(antwort));
    }
}
