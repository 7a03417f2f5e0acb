//! Prometheus-kompatible Metriken fuer onair
//!
//! Registrierte Metriken:
//! - `onair_connections` – Gauge: Aktuell verbundene Signaling-Clients
//! - `onair_presenters_active` – Gauge: Raeume mit reserviertem Presenter-Slot
//! - `onair_viewers_active` – Gauge: Viewer-Sessions ueber alle Raeume
//! - `onair_negotiations_total` – Counter: Aushandlungen (role, result)
//! - `onair_candidates_queued_total` – Counter: Zwischengespeicherte ICE-Kandidaten
//! - `onair_backend_releases_total` – Counter: Freigegebene Backend-Objekte (kind)

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle onair-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metrik-Handles.
#[derive(Clone)]
pub struct OnairMetrics {
    pub registry: Arc<Registry>,

    pub connections: IntGauge,
    pub presenters_active: IntGauge,
    pub viewers_active: IntGauge,
    pub negotiations_total: IntCounterVec,
    pub candidates_queued_total: IntCounter,
    pub backend_releases_total: IntCounterVec,
}

impl OnairMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connections = IntGauge::with_opts(Opts::new(
            "onair_connections",
            "Anzahl aktuell verbundener Signaling-Clients",
        ))?;
        registry.register(Box::new(connections.clone()))?;

        let presenters_active = IntGauge::with_opts(Opts::new(
            "onair_presenters_active",
            "Anzahl Raeume mit aktivem oder reserviertem Presenter",
        ))?;
        registry.register(Box::new(presenters_active.clone()))?;

        let viewers_active = IntGauge::with_opts(Opts::new(
            "onair_viewers_active",
            "Anzahl Viewer-Sessions ueber alle Raeume",
        ))?;
        registry.register(Box::new(viewers_active.clone()))?;

        let negotiations_total = IntCounterVec::new(
            Opts::new(
                "onair_negotiations_total",
                "Abgeschlossene Aushandlungen nach Rolle und Ergebnis",
            ),
            &["role", "result"],
        )?;
        registry.register(Box::new(negotiations_total.clone()))?;

        let candidates_queued_total = IntCounter::with_opts(Opts::new(
            "onair_candidates_queued_total",
            "ICE-Kandidaten die vor Endpunkt-Bereitschaft zwischengespeichert wurden",
        ))?;
        registry.register(Box::new(candidates_queued_total.clone()))?;

        let backend_releases_total = IntCounterVec::new(
            Opts::new(
                "onair_backend_releases_total",
                "Freigegebene Backend-Objekte nach Art",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(backend_releases_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connections,
            presenters_active,
            viewers_active,
            negotiations_total,
            candidates_queued_total,
            backend_releases_total,
        })
    }

    /// Zaehlt eine abgeschlossene Aushandlung
    pub fn aushandlung(&self, rolle: &str, ergebnis: &str) {
        self.negotiations_total
            .with_label_values(&[rolle, ergebnis])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: OnairMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<OnairMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_setzen() {
        let metriken = OnairMetrics::neu().unwrap();
        metriken.presenters_active.set(2);
        metriken.viewers_active.set(7);
        assert_eq!(metriken.presenters_active.get(), 2);
        assert_eq!(metriken.viewers_active.get(), 7);
    }

    #[test]
    fn aushandlungen_mit_labels() {
        let metriken = OnairMetrics::neu().unwrap();
        metriken.aushandlung("presenter", "accepted");
        metriken.aushandlung("presenter", "accepted");
        metriken.aushandlung("viewer", "rejected");

        let wert = metriken
            .negotiations_total
            .with_label_values(&["presenter", "accepted"])
            .get();
        assert_eq!(wert, 2);
    }

    #[test]
    fn export_prometheus_format() {
        let metriken = OnairMetrics::neu().unwrap();
        metriken.connections.set(3);
        metriken.candidates_queued_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("onair_connections 3"));
        assert!(output.contains("onair_candidates_queued_total 1"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn zwei_instanzen_sind_unabhaengig() {
        let a = OnairMetrics::neu().unwrap();
        let b = OnairMetrics::neu().unwrap();
        a.connections.inc();
        assert_eq!(b.connections.get(), 0);
    }
}
