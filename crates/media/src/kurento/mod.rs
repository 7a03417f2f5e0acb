//! KurentoGateway – `MediaGateway` ueber den Kurento Media Server
//!
//! Spricht JSON-RPC 2.0 ueber eine einzelne WebSocket-Verbindung. Die
//! Verbindung wird beim ersten Aufruf aufgebaut und nach einem Abbruch beim
//! naechsten Aufruf neu aufgebaut. Ist das Backend nicht erreichbar, schlaegt
//! jeder Aufruf mit `MediaError::Verbindung` fehl; der Prozess laeuft weiter.
//!
//! ## Tasks pro Verbindung
//! - Schreib-Task: mpsc-Queue -> WebSocket
//! - Lese-Task: WebSocket -> offene Anfragen (oneshot) bzw. Kandidaten-Abos

pub mod rpc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use onair_protocol::IceCandidate;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{MediaError, MediaResult};
use crate::gateway::{EndpointId, MediaEndpoint, MediaGateway, MediaObject, PipelineId};
use rpc::Eingehend;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer die Verbindung zum Kurento Media Server
#[derive(Debug, Clone)]
pub struct KurentoConfig {
    /// WebSocket-URI des Media Servers
    pub uri: String,
    /// Zeitlimit fuer Verbindungsaufbau und einzelne Aufrufe
    pub zeitlimit: Duration,
}

impl Default for KurentoConfig {
    fn default() -> Self {
        Self {
            uri: "ws://localhost:8888/kurento".to_string(),
            zeitlimit: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

/// Offene Anfrage, markiert mit der Verbindungs-Generation
struct OffeneAnfrage {
    generation: u64,
    tx: oneshot::Sender<MediaResult<Value>>,
}

/// Kandidaten-Abonnement eines Endpunkts
struct Abo {
    generation: u64,
    tx: mpsc::UnboundedSender<IceCandidate>,
}

/// Aktive WebSocket-Verbindung
#[derive(Clone)]
struct Verbindung {
    generation: u64,
    sende_tx: mpsc::UnboundedSender<String>,
    aktiv: Arc<AtomicBool>,
}

struct KurentoInner {
    config: KurentoConfig,
    naechste_id: AtomicU64,
    naechste_generation: AtomicU64,
    verbindung: tokio::sync::Mutex<Option<Verbindung>>,
    /// Generation der zuletzt aufgebauten Verbindung (0 = noch keine)
    aktuelle_generation: AtomicU64,
    offen: DashMap<u64, OffeneAnfrage>,
    abos: DashMap<String, Abo>,
    session_id: parking_lot::Mutex<Option<String>>,
    erreichbar: AtomicBool,
}

// ---------------------------------------------------------------------------
// KurentoGateway
// ---------------------------------------------------------------------------

/// `MediaGateway`-Implementierung fuer den Kurento Media Server
///
/// Clone teilt Verbindung und Zustand.
#[derive(Clone)]
pub struct KurentoGateway {
    inner: Arc<KurentoInner>,
}

impl KurentoGateway {
    /// Erstellt ein neues Gateway (ohne sofortigen Verbindungsaufbau)
    pub fn neu(config: KurentoConfig) -> Self {
        Self {
            inner: Arc::new(KurentoInner {
                config,
                naechste_id: AtomicU64::new(1),
                naechste_generation: AtomicU64::new(1),
                verbindung: tokio::sync::Mutex::new(None),
                aktuelle_generation: AtomicU64::new(0),
                offen: DashMap::new(),
                abos: DashMap::new(),
                session_id: parking_lot::Mutex::new(None),
                erreichbar: AtomicBool::new(false),
            }),
        }
    }

    /// Liefert die aktive Verbindung oder baut eine neue auf
    async fn verbindung_sicherstellen(&self) -> MediaResult<Verbindung> {
        let mut slot = self.inner.verbindung.lock().await;
        if let Some(v) = slot.as_ref() {
            if v.aktiv.load(Ordering::Acquire) {
                return Ok(v.clone());
            }
        }

        let uri = self.inner.config.uri.clone();
        let verbindungsaufbau = tokio_tungstenite::connect_async(uri.as_str());
        let (ws, _) = match tokio::time::timeout(self.inner.config.zeitlimit, verbindungsaufbau)
            .await
        {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                self.inner.erreichbar.store(false, Ordering::Relaxed);
                tracing::warn!(uri = %uri, fehler = %e, "Medien-Backend nicht erreichbar");
                return Err(MediaError::Verbindung(format!("{}: {}", uri, e)));
            }
            Err(_) => {
                self.inner.erreichbar.store(false, Ordering::Relaxed);
                tracing::warn!(uri = %uri, "Zeitlimit beim Verbindungsaufbau zum Medien-Backend");
                return Err(MediaError::Verbindung(format!("{}: Zeitlimit", uri)));
            }
        };

        let generation = self.inner.naechste_generation.fetch_add(1, Ordering::Relaxed);
        let aktiv = Arc::new(AtomicBool::new(true));
        let (sende_tx, mut sende_rx) = mpsc::unbounded_channel::<String>();
        let (mut schreiber, mut leser) = ws.split();

        // Schreib-Task
        let aktiv_schreiber = Arc::clone(&aktiv);
        tokio::spawn(async move {
            while let Some(frame) = sende_rx.recv().await {
                if let Err(e) = schreiber.send(Message::Text(frame)).await {
                    tracing::warn!(fehler = %e, "Senden an Medien-Backend fehlgeschlagen");
                    break;
                }
            }
            aktiv_schreiber.store(false, Ordering::Release);
            let _ = schreiber.close().await;
        });

        // Lese-Task
        let gateway = self.clone();
        let aktiv_leser = Arc::clone(&aktiv);
        tokio::spawn(async move {
            while let Some(nachricht) = leser.next().await {
                match nachricht {
                    Ok(Message::Text(text)) => gateway.eingehend_verarbeiten(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Lesefehler auf Medien-Backend-Verbindung");
                        break;
                    }
                }
            }
            aktiv_leser.store(false, Ordering::Release);
            gateway.verbindung_verloren(generation);
        });

        let verbindung = Verbindung {
            generation,
            sende_tx,
            aktiv,
        };
        *slot = Some(verbindung.clone());
        {
            // Gegen verbindung_verloren einer aelteren Generation
            let _sitzung = self.inner.session_id.lock();
            self.inner.aktuelle_generation.store(generation, Ordering::Relaxed);
            self.inner.erreichbar.store(true, Ordering::Relaxed);
        }
        tracing::info!(uri = %self.inner.config.uri, generation, "Mit Medien-Backend verbunden");

        Ok(verbindung)
    }

    /// Raeumt nach einem Verbindungsabbruch auf
    ///
    /// Offene Anfragen dieser Generation scheitern mit `Getrennt`, ihre
    /// Kandidaten-Abos werden geschlossen. Erreichbarkeit und Session-ID
    /// werden nur zurueckgesetzt, wenn `generation` die aktuelle Verbindung ist.
    fn verbindung_verloren(&self, generation: u64) {
        let betroffen: Vec<u64> = self
            .inner
            .offen
            .iter()
            .filter(|e| e.value().generation == generation)
            .map(|e| *e.key())
            .collect();
        for id in betroffen {
            if let Some((_, anfrage)) = self.inner.offen.remove(&id) {
                let _ = anfrage.tx.send(Err(MediaError::Getrennt));
            }
        }
        self.inner.abos.retain(|_, abo| abo.generation != generation);

        let mut sitzung = self.inner.session_id.lock();
        if self.inner.aktuelle_generation.load(Ordering::Relaxed) != generation {
            tracing::debug!(generation, "Abbruch einer abgeloesten Backend-Verbindung");
            return;
        }
        self.inner.erreichbar.store(false, Ordering::Relaxed);
        *sitzung = None;
        drop(sitzung);

        tracing::warn!(generation, "Verbindung zum Medien-Backend verloren");
    }

    /// Verteilt eine eingehende Nachricht
    fn eingehend_verarbeiten(&self, text: &str) {
        match rpc::eingehend_parsen(text) {
            Ok(Eingehend::Antwort { id, ergebnis }) => {
                if let Ok(result) = &ergebnis {
                    if let Some(sid) = result.get("sessionId").and_then(Value::as_str) {
                        *self.inner.session_id.lock() = Some(sid.to_owned());
                    }
                }
                match self.inner.offen.remove(&id) {
                    Some((_, anfrage)) => {
                        let _ = anfrage.tx.send(ergebnis);
                    }
                    None => tracing::debug!(id, "Antwort auf unbekannte Anfrage verworfen"),
                }
            }
            Ok(Eingehend::Kandidat { object, candidate }) => {
                if let Some(abo) = self.inner.abos.get(&object) {
                    let _ = abo.tx.send(candidate);
                } else {
                    tracing::trace!(object = %object, "Kandidat fuer unbekannten Endpunkt");
                }
            }
            Ok(Eingehend::Sonstiges) => {}
            Err(e) => tracing::warn!(fehler = %e, "Unverstaendliche Nachricht vom Medien-Backend"),
        }
    }

    /// Sendet eine Anfrage und wartet auf die Antwort
    async fn anfrage(&self, method: &str, mut params: Value) -> MediaResult<Value> {
        let verbindung = self.verbindung_sicherstellen().await?;
        let id = self.inner.naechste_id.fetch_add(1, Ordering::Relaxed);

        if let (Some(sid), Some(obj)) = (self.inner.session_id.lock().clone(), params.as_object_mut())
        {
            obj.insert("sessionId".into(), Value::String(sid));
        }

        let (tx, rx) = oneshot::channel();
        self.inner.offen.insert(
            id,
            OffeneAnfrage {
                generation: verbindung.generation,
                tx,
            },
        );

        if verbindung
            .sende_tx
            .send(rpc::anfrage_frame(id, method, params))
            .is_err()
        {
            self.inner.offen.remove(&id);
            return Err(MediaError::Getrennt);
        }

        match tokio::time::timeout(self.inner.config.zeitlimit, rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(MediaError::Getrennt),
            Err(_) => {
                self.inner.offen.remove(&id);
                Err(MediaError::Zeitlimit(method.to_owned()))
            }
        }
    }

    async fn invoke(&self, object: &str, operation: &str, params: Value) -> MediaResult<Value> {
        self.anfrage("invoke", rpc::invoke_params(object, operation, params))
            .await
    }

    async fn erzeugen(&self, typ: &str, constructor_params: Value) -> MediaResult<String> {
        let result = self
            .anfrage(
                "create",
                json!({
                    "type": typ,
                    "constructorParams": constructor_params,
                    "properties": {},
                }),
            )
            .await?;
        rpc::wert_als_string(&result)
    }
}

#[async_trait]
impl MediaGateway for KurentoGateway {
    async fn create_pipeline(&self) -> MediaResult<PipelineId> {
        let id = self.erzeugen("MediaPipeline", json!({})).await?;
        tracing::debug!(pipeline = %id, "MediaPipeline erzeugt");
        Ok(PipelineId(id))
    }

    async fn create_endpoint(&self, pipeline: &PipelineId) -> MediaResult<MediaEndpoint> {
        let id = self
            .erzeugen("WebRtcEndpoint", json!({ "mediaPipeline": pipeline.0 }))
            .await?;

        // Abo vor dem subscribe-Aufruf eintragen, damit fruehe Events nicht verloren gehen
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self
            .inner
            .verbindung
            .lock()
            .await
            .as_ref()
            .map(|v| v.generation)
            .unwrap_or_default();
        self.inner.abos.insert(id.clone(), Abo { generation, tx });

        if let Err(e) = self
            .anfrage("subscribe", json!({ "type": rpc::ICE_EVENT, "object": id }))
            .await
        {
            self.inner.abos.remove(&id);
            let _ = self.anfrage("release", json!({ "object": id })).await;
            return Err(e);
        }

        tracing::debug!(pipeline = %pipeline, endpoint = %id, "WebRtcEndpoint erzeugt");
        Ok(MediaEndpoint {
            id: EndpointId(id),
            candidates: rx,
        })
    }

    async fn process_offer(&self, endpoint: &EndpointId, sdp_offer: &str) -> MediaResult<String> {
        let result = self
            .invoke(&endpoint.0, "processOffer", json!({ "offer": sdp_offer }))
            .await?;
        rpc::wert_als_string(&result)
    }

    async fn add_candidate(
        &self,
        endpoint: &EndpointId,
        candidate: IceCandidate,
    ) -> MediaResult<()> {
        self.invoke(
            &endpoint.0,
            "addIceCandidate",
            json!({ "candidate": rpc::kandidat_json(&candidate) }),
        )
        .await?;
        Ok(())
    }

    async fn gather_candidates(&self, endpoint: &EndpointId) -> MediaResult<()> {
        self.invoke(&endpoint.0, "gatherCandidates", json!({}))
            .await?;
        Ok(())
    }

    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> MediaResult<()> {
        self.invoke(&source.0, "connect", json!({ "sink": sink.0 }))
            .await?;
        Ok(())
    }

    async fn release(&self, object: MediaObject) -> MediaResult<()> {
        self.inner.abos.remove(object.id());
        self.anfrage("release", json!({ "object": object.id() }))
            .await?;
        tracing::debug!(object = %object.id(), "Backend-Objekt freigegeben");
        Ok(())
    }

    fn ist_erreichbar(&self) -> bool {
        self.inner.erreichbar.load(Ordering::Relaxed)
    }
}
