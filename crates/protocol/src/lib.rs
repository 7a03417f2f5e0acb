//! onair-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, die zwischen Browser-Client
//! und Signaling-Server ausgetauscht werden, sowie deren Wire-Format.

pub mod control;
pub mod wire;

pub use control::{
    ChatMessage, ClientEvent, IceCandidate, NegotiationResponse, ResponseStatus, ServerEvent,
};
pub use wire::TextCodec;
