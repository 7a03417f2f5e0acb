//! onair-signaling – WebSocket-Signaling fuer Broadcast-Raeume
//!
//! Dieser Crate implementiert den Signaling-Kern von onair: pro Raum ein
//! Presenter, beliebig viele Viewer, Aushandlung gegen ein asynchrones
//! Medien-Backend und konsistenter Abbau, auch wenn eine Aushandlung noch
//! laeuft.
//!
//! ## Architektur
//!
//! ```text
//! SignalingServer (axum, WebSocket-Upgrade)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task, ConnectionContext)
//!     |
//!     v
//! EventRouter
//!     |
//!     +-- Raum/Chat       (joinRoom, subscribeToStream, chat:*)
//!     +-- SessionController
//!             |  presenter / viewer / onIceCandidate / stop
//!             v
//!         RoomRegistry (Room pro Name, CandidateQueue)  +  dyn MediaGateway
//!
//! EventBroadcaster – Events an Verbindungen und Raeume senden
//! ```

pub mod broadcast;
pub mod candidate_queue;
pub mod chat;
pub mod connection;
pub mod error;
pub mod room;
pub mod router;
pub mod server;
pub mod server_state;
pub mod session;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use candidate_queue::CandidateQueue;
pub use chat::ChatLog;
pub use connection::ClientConnection;
pub use error::{Rejection, SignalingError, SignalingResult};
pub use room::{Room, RoomRegistry};
pub use router::{ConnectionContext, EventRouter};
pub use server::SignalingServer;
pub use server_state::{SignalingConfig, SignalingState};
pub use session::{Aushandlung, SessionController};
