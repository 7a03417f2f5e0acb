//! Signaling-Protokoll (WebSocket, JSON-Textframes)
//!
//! Definiert alle Nachrichten die zwischen Browser-Client und Server
//! ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht ist ein JSON-Objekt mit dem Diskriminator `id`
//! - Tagged Enums fuer typsichere, abgeschlossene Nachrichtentypen
//! - SDP und ICE-Kandidaten werden nur transportiert, nie interpretiert

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ICE-Kandidat
// ---------------------------------------------------------------------------

/// Konnektivitaets-Kandidat im Format von `RTCIceCandidateInit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// SDP-Attributzeile (`candidate:...`)
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Erstellt einen Kandidaten ohne Medien-Zuordnung
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Eine Chat-Nachricht im Raum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Eingehende Signaling-Events vom Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Verbindung einem Raum zuordnen
    JoinRoom {
        room: String,
        #[serde(default)]
        username: String,
    },
    /// Raum beitreten und ueber laufenden Stream informiert werden
    SubscribeToStream {
        room: String,
        #[serde(default)]
        username: String,
    },
    /// Als Presenter senden
    #[serde(rename_all = "camelCase")]
    Presenter { sdp_offer: String },
    /// Als Viewer empfangen
    #[serde(rename_all = "camelCase")]
    Viewer { sdp_offer: String },
    /// Lokal gefundener ICE-Kandidat des Clients
    OnIceCandidate { candidate: IceCandidate },
    /// Eigene Session beenden
    Stop,
    /// Chat-Nachricht an den Raum
    #[serde(rename = "chat:newMessage")]
    ChatNewMessage { text: String },
    /// Chat-Verlauf des Raums anfordern
    #[serde(rename = "chat:loadMessages")]
    ChatLoadMessages,
}

impl ClientEvent {
    /// Name des Events auf dem Draht (fuer Logging)
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "joinRoom",
            Self::SubscribeToStream { .. } => "subscribeToStream",
            Self::Presenter { .. } => "presenter",
            Self::Viewer { .. } => "viewer",
            Self::OnIceCandidate { .. } => "onIceCandidate",
            Self::Stop => "stop",
            Self::ChatNewMessage { .. } => "chat:newMessage",
            Self::ChatLoadMessages => "chat:loadMessages",
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Ergebnis einer Aushandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Accepted,
    Rejected,
}

/// Antwort auf `presenter` bzw. `viewer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    pub response: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NegotiationResponse {
    pub fn accepted(sdp_answer: impl Into<String>) -> Self {
        Self {
            response: ResponseStatus::Accepted,
            sdp_answer: Some(sdp_answer.into()),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            response: ResponseStatus::Rejected,
            sdp_answer: None,
            message: Some(message.into()),
        }
    }

    pub fn ist_akzeptiert(&self) -> bool {
        self.response == ResponseStatus::Accepted
    }
}

/// Ausgehende Signaling-Events an den Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerEvent {
    PresenterResponse(NegotiationResponse),
    ViewerResponse(NegotiationResponse),
    /// Vom Medien-Backend gefundener Kandidat
    IceCandidate { candidate: IceCandidate },
    JoinedRoom,
    /// Im Raum sendet jetzt ein Presenter
    StreamStarted,
    /// Presenter hat den Raum verlassen, Viewer-Session ist beendet
    StopCommunication,
    #[serde(rename = "chat:newMessage")]
    ChatNewMessage(ChatMessage),
    #[serde(rename = "chat:messages")]
    ChatMessages { messages: Vec<ChatMessage> },
    /// Protokoll- oder Laufzeitfehler ausserhalb einer Aushandlung
    Error { message: String },
}

impl ServerEvent {
    /// Erstellt ein Fehler-Event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presenter_event_aus_browser_json() {
        let event: ClientEvent =
            serde_json::from_value(json!({"id": "presenter", "sdpOffer": "v=0"})).unwrap();
        assert_eq!(
            event,
            ClientEvent::Presenter {
                sdp_offer: "v=0".into()
            }
        );
    }

    #[test]
    fn chat_events_mit_doppelpunkt_namen() {
        let event: ClientEvent =
            serde_json::from_value(json!({"id": "chat:newMessage", "text": "hallo"})).unwrap();
        assert_eq!(event.name(), "chat:newMessage");

        let event: ClientEvent =
            serde_json::from_value(json!({"id": "chat:loadMessages"})).unwrap();
        assert_eq!(event, ClientEvent::ChatLoadMessages);
    }

    #[test]
    fn join_room_ohne_username() {
        let event: ClientEvent =
            serde_json::from_value(json!({"id": "joinRoom", "room": "lobby"})).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room: "lobby".into(),
                username: String::new()
            }
        );
    }

    #[test]
    fn ice_kandidat_browser_format() {
        let event: ClientEvent = serde_json::from_value(json!({
            "id": "onIceCandidate",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }))
        .unwrap();

        let ClientEvent::OnIceCandidate { candidate } = event else {
            panic!("Erwartet OnIceCandidate");
        };
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
    }

    #[test]
    fn unbekanntes_event_wird_abgelehnt() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"id": "reboot"}));
        assert!(result.is_err());
    }

    #[test]
    fn akzeptierte_antwort_format() {
        let event = ServerEvent::PresenterResponse(NegotiationResponse::accepted("v=0 answer"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"id": "presenterResponse", "response": "accepted", "sdpAnswer": "v=0 answer"})
        );
    }

    #[test]
    fn abgelehnte_antwort_format() {
        let event = ServerEvent::ViewerResponse(NegotiationResponse::rejected("kein Presenter"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"id": "viewerResponse", "response": "rejected", "message": "kein Presenter"})
        );
    }

    #[test]
    fn einfache_server_events() {
        assert_eq!(
            serde_json::to_value(ServerEvent::StopCommunication).unwrap(),
            json!({"id": "stopCommunication"})
        );
        assert_eq!(
            serde_json::to_value(ServerEvent::StreamStarted).unwrap(),
            json!({"id": "streamStarted"})
        );
    }

    #[test]
    fn chat_nachricht_format() {
        let event = ServerEvent::ChatNewMessage(ChatMessage {
            message: "hi".into(),
            username: "ana".into(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"id": "chat:newMessage", "message": "hi", "username": "ana"})
        );
    }
}
