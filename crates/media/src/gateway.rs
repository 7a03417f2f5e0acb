//! MediaGateway – asynchrone Faehigkeits-Schnittstelle zum Medien-Backend
//!
//! Jeder Aufruf ist ein Suspendierungspunkt und kann fehlschlagen. Die
//! Handles sind opak: der Signaling-Kern speichert und uebergibt sie nur.

use async_trait::async_trait;
use onair_protocol::IceCandidate;
use tokio::sync::mpsc;

use crate::error::MediaResult;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opakes Handle auf eine Verarbeitungs-Pipeline des Backends
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineId(pub String);

/// Opakes Handle auf einen Medien-Endpunkt innerhalb einer Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(pub String);

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Freigebbares Backend-Objekt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaObject {
    Pipeline(PipelineId),
    Endpoint(EndpointId),
}

impl MediaObject {
    /// Backend-seitige Objekt-ID
    pub fn id(&self) -> &str {
        match self {
            Self::Pipeline(p) => &p.0,
            Self::Endpoint(e) => &e.0,
        }
    }
}

impl From<PipelineId> for MediaObject {
    fn from(p: PipelineId) -> Self {
        Self::Pipeline(p)
    }
}

impl From<EndpointId> for MediaObject {
    fn from(e: EndpointId) -> Self {
        Self::Endpoint(e)
    }
}

/// Empfaenger fuer vom Backend gefundene ICE-Kandidaten eines Endpunkts
///
/// Der Kanal wird geschlossen, sobald der Endpunkt freigegeben wird oder
/// die Verbindung zum Backend verloren geht.
pub type CandidateReceiver = mpsc::UnboundedReceiver<IceCandidate>;

/// Frisch erzeugter Endpunkt samt Kandidaten-Abonnement
#[derive(Debug)]
pub struct MediaEndpoint {
    pub id: EndpointId,
    pub candidates: CandidateReceiver,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Asynchrone Schnittstelle zum Medien-Backend
#[async_trait]
pub trait MediaGateway: Send + Sync + 'static {
    /// Erzeugt eine neue Verarbeitungs-Pipeline
    async fn create_pipeline(&self) -> MediaResult<PipelineId>;

    /// Erzeugt einen WebRTC-Endpunkt in `pipeline`
    ///
    /// Das Kandidaten-Abonnement wird zusammen mit dem Endpunkt registriert.
    async fn create_endpoint(&self, pipeline: &PipelineId) -> MediaResult<MediaEndpoint>;

    /// Verarbeitet ein SDP-Angebot und liefert die SDP-Antwort
    async fn process_offer(&self, endpoint: &EndpointId, sdp_offer: &str) -> MediaResult<String>;

    /// Uebergibt einen Kandidaten der Gegenseite an den Endpunkt
    async fn add_candidate(&self, endpoint: &EndpointId, candidate: IceCandidate)
        -> MediaResult<()>;

    /// Startet die Kandidatensuche des Endpunkts
    async fn gather_candidates(&self, endpoint: &EndpointId) -> MediaResult<()>;

    /// Verbindet `source` mit `sink` (Medienfluss source -> sink)
    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> MediaResult<()>;

    /// Gibt einen Endpunkt oder eine Pipeline frei
    async fn release(&self, object: MediaObject) -> MediaResult<()>;

    /// Ob das Backend zuletzt erreichbar war (fuer Health-Checks)
    fn ist_erreichbar(&self) -> bool {
        true
    }
}
