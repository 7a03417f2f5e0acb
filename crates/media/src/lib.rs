//! onair-media – Schnittstelle zum Medien-Backend
//!
//! Der Signaling-Kern spricht das Medien-Backend ausschliesslich ueber den
//! asynchronen `MediaGateway`-Trait an. Dieses Crate enthaelt den Trait,
//! die opaken Handles und die Kurento-Implementierung (JSON-RPC ueber
//! WebSocket).
//!
//! ```text
//! SessionController
//!     |
//!     v
//! dyn MediaGateway
//!     |
//!     +-- KurentoGateway  (JSON-RPC 2.0, ws://host:8888/kurento)
//! ```

pub mod error;
pub mod gateway;
pub mod kurento;

pub use error::{MediaError, MediaResult};
pub use gateway::{
    CandidateReceiver, EndpointId, MediaEndpoint, MediaGateway, MediaObject, PipelineId,
};
pub use kurento::{KurentoConfig, KurentoGateway};
