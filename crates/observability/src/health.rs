//! Health-Check-Endpunkt fuer onair
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Erreichbarkeit des Medien-Backends.
//! Ein nicht erreichbares Backend ergibt `degraded`, nicht `unhealthy` –
//! Signaling und Chat funktionieren weiter, nur Aushandlungen werden abgelehnt.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub media_backend_reachable: bool,
}

/// Prueft ob das Medien-Backend erreichbar ist
pub type BackendCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    backend_check: BackendCheck,
}

impl HealthState {
    pub fn neu(backend_check: BackendCheck) -> Self {
        Self {
            start_time: Instant::now(),
            backend_check,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn antwort(&self) -> HealthResponse {
        let erreichbar = (self.backend_check)();
        HealthResponse {
            status: if erreichbar {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            media_backend_reachable: erreichbar,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – 200 auch bei `degraded` (Liveness-Check soll nicht failen)
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn status_folgt_backend_erreichbarkeit() {
        let flag = Arc::new(AtomicBool::new(true));
        let check_flag = Arc::clone(&flag);
        let state = HealthState::neu(Arc::new(move || check_flag.load(Ordering::Relaxed)));

        assert_eq!(state.antwort().status, HealthStatus::Healthy);

        flag.store(false, Ordering::Relaxed);
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Degraded);
        assert!(!antwort.media_backend_reachable);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            media_backend_reachable: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"media_backend_reachable\":true"));
    }
}
