//! SessionController – Presenter- und Viewer-Aushandlung gegen das Medien-Backend
//!
//! ## Ablauf Presenter
//! ```text
//! presenter_vorbereiten (sync, beim Eintreffen des Events):
//!   Queue verwerfen -> Slot reservieren oder Konflikt entscheiden
//! aushandeln (async): create_pipeline -> pruefen
//!   -> create_endpoint -> pruefen -> Queue in Endpunkt leeren -> process_offer
//!   -> pruefen -> Antwort + gather_candidates (im Hintergrund)
//! ```
//!
//! Der Viewer-Ablauf ist analog, nutzt die Pipeline des Raums und verbindet
//! vor der Antwort den Presenter-Endpunkt mit dem Viewer-Endpunkt.
//!
//! ## Veraltete Fortsetzungen
//! Nach jedem `.await` wird die Generation der eigenen Session geprueft. Ist
//! sie nicht mehr im Raum, gibt die Fortsetzung nur frei, was sie selbst
//! erhalten und noch nicht an den Raum uebergeben hat, und meldet
//! `NoActivePresenter`. Der Raum wird dabei nicht veraendert.

use onair_core::{ConnectionId, RoomName};
use onair_media::{
    CandidateReceiver, EndpointId, MediaEndpoint, MediaError, MediaGateway, MediaObject,
    PipelineId,
};
use onair_observability::OnairMetrics;
use onair_protocol::{IceCandidate, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::EventBroadcaster;
use crate::error::Rejection;
use crate::room::{Abbau, BereiterEndpunkt, RaumHandle, Rolle, Room, RoomRegistry};

/// Grund fuer den Abbruch einer laufenden Aushandlung
#[derive(Debug)]
enum Abbruch {
    /// Die Session wurde waehrend eines Backend-Aufrufs ungueltig
    Veraltet,
    /// Ein Backend-Aufruf ist fehlgeschlagen
    Backend(MediaError),
}

impl From<MediaError> for Abbruch {
    fn from(e: MediaError) -> Self {
        Self::Backend(e)
    }
}

/// Was eine Viewer-Reservierung vom Raum braucht
struct ViewerReservierung {
    pipeline: PipelineId,
    presenter_endpunkt: EndpointId,
    presenter_generation: u64,
    /// Eine vorherige Viewer-Session derselben Verbindung wurde ersetzt
    ersetzt: bool,
    alter_endpunkt: Option<EndpointId>,
}

enum Schritt {
    Presenter,
    Viewer(ViewerReservierung),
    /// Ablehnung; `abbau` enthaelt eine bereits aus dem Raum entfernte Session
    Abgelehnt { grund: Rejection, abbau: Abbau },
}

/// Synchron vorbereitete Aushandlung
///
/// Entsteht beim Eintreffen von `presenter`/`viewer`: die Kandidaten-Queue
/// ist verworfen und der Slot reserviert (oder die Ablehnung entschieden).
/// Ein `stop` danach findet die Session bereits im Raum. Die Backend-Aufrufe
/// folgen in [`SessionController::aushandeln`].
pub struct Aushandlung {
    connection_id: ConnectionId,
    room: RoomName,
    raum: RaumHandle,
    generation: u64,
    rolle: Rolle,
    schritt: Schritt,
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Orchestriert Aushandlung, Kandidaten-Routing und Abbau
///
/// Clone teilt Registry, Gateway und Broadcaster.
#[derive(Clone)]
pub struct SessionController {
    registry: Arc<RoomRegistry>,
    gateway: Arc<dyn MediaGateway>,
    broadcaster: EventBroadcaster,
    metriken: OnairMetrics,
}

impl SessionController {
    pub fn neu(
        registry: Arc<RoomRegistry>,
        gateway: Arc<dyn MediaGateway>,
        broadcaster: EventBroadcaster,
        metriken: OnairMetrics,
    ) -> Self {
        Self {
            registry,
            gateway,
            broadcaster,
            metriken,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Ob im Raum ein Presenter mit bereitem Endpunkt sendet
    pub fn presenter_aktiv(&self, room: &RoomName) -> bool {
        self.registry
            .get(room)
            .is_some_and(|raum| raum.lock().presenter_bereit())
    }

    // -----------------------------------------------------------------------
    // Reservierung (synchron)
    // -----------------------------------------------------------------------

    /// Verwirft die Queue und reserviert den Presenter-Slot
    ///
    /// Ist der Slot belegt, wird die eigene Session der Verbindung sofort aus
    /// dem Raum entfernt; die Freigaben folgen in `aushandeln`.
    pub fn presenter_vorbereiten(&self, connection_id: ConnectionId, room: &RoomName) -> Aushandlung {
        let raum = self.registry.get_or_create(room);
        self.registry.kandidaten().verwerfen(&connection_id);

        let generation = self.registry.naechste_generation();
        let schritt = {
            let mut r = raum.lock();
            if r.presenter_reservieren(connection_id, generation) {
                Schritt::Presenter
            } else {
                Schritt::Abgelehnt {
                    grund: Rejection::PresenterConflict,
                    abbau: r.verbindung_entfernen(&connection_id, None),
                }
            }
        };

        if matches!(schritt, Schritt::Presenter) {
            self.metriken.presenters_active.inc();
            tracing::info!(
                connection_id = %connection_id,
                room = %room,
                generation,
                "Presenter-Slot reserviert"
            );
        } else {
            tracing::info!(
                connection_id = %connection_id,
                room = %room,
                "Presenter-Slot belegt – Anfrage abgelehnt"
            );
        }

        Aushandlung {
            connection_id,
            room: room.clone(),
            raum,
            generation,
            rolle: Rolle::Presenter,
            schritt,
        }
    }

    /// Verwirft die Queue und reserviert eine Viewer-Session
    pub fn viewer_vorbereiten(&self, connection_id: ConnectionId, room: &RoomName) -> Aushandlung {
        let raum = self.registry.get_or_create(room);
        self.registry.kandidaten().verwerfen(&connection_id);

        let generation = self.registry.naechste_generation();
        let reservierung = viewer_reservieren(&mut raum.lock(), connection_id, generation);
        let schritt = match reservierung {
            Ok(reservierung) => {
                if !reservierung.ersetzt {
                    self.metriken.viewers_active.inc();
                }
                tracing::info!(
                    connection_id = %connection_id,
                    room = %room,
                    generation,
                    "Viewer-Session reserviert"
                );
                Schritt::Viewer(reservierung)
            }
            Err(grund) => {
                tracing::info!(
                    connection_id = %connection_id,
                    room = %room,
                    grund = %grund,
                    "Viewer-Anfrage abgelehnt"
                );
                Schritt::Abgelehnt {
                    grund,
                    abbau: Abbau::default(),
                }
            }
        };

        Aushandlung {
            connection_id,
            room: room.clone(),
            raum,
            generation,
            rolle: Rolle::Viewer,
            schritt,
        }
    }

    // -----------------------------------------------------------------------
    // Aushandlung (asynchron)
    // -----------------------------------------------------------------------

    /// Handelt die Presenter-Rolle fuer `connection_id` in `room` aus
    ///
    /// Liefert die SDP-Antwort des Backends.
    pub async fn start_presenting(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        sdp_offer: &str,
    ) -> Result<String, Rejection> {
        let aushandlung = self.presenter_vorbereiten(connection_id, room);
        self.aushandeln(aushandlung, sdp_offer).await
    }

    /// Handelt die Viewer-Rolle fuer `connection_id` in `room` aus
    pub async fn start_viewing(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        sdp_offer: &str,
    ) -> Result<String, Rejection> {
        let aushandlung = self.viewer_vorbereiten(connection_id, room);
        self.aushandeln(aushandlung, sdp_offer).await
    }

    /// Fuehrt eine vorbereitete Aushandlung gegen das Backend zu Ende
    pub async fn aushandeln(
        &self,
        aushandlung: Aushandlung,
        sdp_offer: &str,
    ) -> Result<String, Rejection> {
        let rolle = aushandlung.rolle;
        let ergebnis = self.aushandlung_ausfuehren(aushandlung, sdp_offer).await;
        self.aushandlung_zaehlen(rolle, &ergebnis);
        ergebnis
    }

    async fn aushandlung_ausfuehren(
        &self,
        aushandlung: Aushandlung,
        sdp_offer: &str,
    ) -> Result<String, Rejection> {
        let Aushandlung {
            connection_id,
            room,
            raum,
            generation,
            rolle,
            schritt,
        } = aushandlung;

        let verlauf = match schritt {
            Schritt::Abgelehnt { grund, abbau } => {
                self.abbau_ausfuehren(connection_id, &room, abbau).await;
                return Err(grund);
            }
            Schritt::Presenter => {
                self.presenter_aushandeln(connection_id, &room, &raum, generation, sdp_offer)
                    .await
            }
            Schritt::Viewer(reservierung) => {
                if let Some(alt) = reservierung.alter_endpunkt.clone() {
                    self.freigeben(MediaObject::Endpoint(alt)).await;
                }
                self.viewer_aushandeln(
                    connection_id,
                    &room,
                    &raum,
                    generation,
                    &reservierung,
                    sdp_offer,
                )
                .await
            }
        };

        match verlauf {
            Ok(antwort) => {
                tracing::info!(
                    connection_id = %connection_id,
                    room = %room,
                    rolle = rolle.als_str(),
                    "Aushandlung abgeschlossen"
                );
                Ok(antwort)
            }
            Err(abbruch) => Err(self
                .abbruch_behandeln(connection_id, &room, &raum, generation, abbruch)
                .await),
        }
    }

    async fn presenter_aushandeln(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        raum: &RaumHandle,
        generation: u64,
        sdp_offer: &str,
    ) -> Result<String, Abbruch> {
        let gueltig = |r: &Room| r.presenter_gueltig(&connection_id, generation);

        let pipeline = self.gateway.create_pipeline().await?;
        let gespeichert = {
            let mut r = raum.lock();
            if gueltig(&*r) {
                r.pipeline_setzen(pipeline.clone());
                true
            } else {
                false
            }
        };
        if !gespeichert {
            self.freigeben(MediaObject::Pipeline(pipeline)).await;
            return Err(Abbruch::Veraltet);
        }
        tracing::debug!(connection_id = %connection_id, pipeline = %pipeline, "Pipeline erzeugt");

        let endpunkt = self.gateway.create_endpoint(&pipeline).await?;
        let endpoint_id = self
            .endpunkt_veroeffentlichen(connection_id, raum, generation, endpunkt, &gueltig)
            .await?;

        let antwort = self.gateway.process_offer(&endpoint_id, sdp_offer).await?;
        let noch_gueltig = gueltig(&*raum.lock());
        if !noch_gueltig {
            return Err(Abbruch::Veraltet);
        }

        self.kandidatensuche_starten(
            connection_id,
            room.clone(),
            Arc::clone(raum),
            generation,
            endpoint_id,
        );
        Ok(antwort)
    }

    async fn viewer_aushandeln(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        raum: &RaumHandle,
        generation: u64,
        reservierung: &ViewerReservierung,
        sdp_offer: &str,
    ) -> Result<String, Abbruch> {
        let presenter_generation = reservierung.presenter_generation;
        let gueltig = |r: &Room| {
            r.viewer_gueltig(&connection_id, generation)
                && r.presenter().map(|p| p.generation) == Some(presenter_generation)
        };

        let endpunkt = self.gateway.create_endpoint(&reservierung.pipeline).await?;
        let endpoint_id = self
            .endpunkt_veroeffentlichen(connection_id, raum, generation, endpunkt, &gueltig)
            .await?;

        let antwort = self.gateway.process_offer(&endpoint_id, sdp_offer).await?;
        let noch_gueltig = gueltig(&*raum.lock());
        if !noch_gueltig {
            return Err(Abbruch::Veraltet);
        }

        self.gateway
            .connect(&reservierung.presenter_endpunkt, &endpoint_id)
            .await?;
        let noch_gueltig = gueltig(&*raum.lock());
        if !noch_gueltig {
            return Err(Abbruch::Veraltet);
        }

        self.kandidatensuche_starten(
            connection_id,
            room.clone(),
            Arc::clone(raum),
            generation,
            endpoint_id,
        );
        Ok(antwort)
    }

    // -----------------------------------------------------------------------
    // Kandidaten
    // -----------------------------------------------------------------------

    /// Leitet einen Kandidaten der Gegenseite weiter oder puffert ihn
    ///
    /// Synchron: die Zustellung an das Backend uebernimmt der Endpunkt-Task
    /// in Ankunftsreihenfolge.
    pub fn on_ice_candidate(
        &self,
        connection_id: ConnectionId,
        room: Option<&RoomName>,
        candidate: IceCandidate,
    ) {
        let Some(raum) = room.and_then(|name| self.registry.get(name)) else {
            self.kandidat_puffern(connection_id, candidate);
            return;
        };

        // Puffern unter dem Raum-Lock, damit kein Leeren dazwischen kommt
        let r = raum.lock();
        if let Some(endpunkt) = r.session(&connection_id).and_then(|s| s.endpunkt.as_ref()) {
            if endpunkt.zufuhr.send(candidate).is_err() {
                tracing::debug!(
                    connection_id = %connection_id,
                    endpoint = %endpunkt.id,
                    "Endpunkt-Task beendet – Kandidat verworfen"
                );
            }
            return;
        }
        self.kandidat_puffern(connection_id, candidate);
    }

    fn kandidat_puffern(&self, connection_id: ConnectionId, candidate: IceCandidate) {
        self.registry.kandidaten().einreihen(connection_id, candidate);
        self.metriken.candidates_queued_total.inc();
        tracing::trace!(connection_id = %connection_id, "Kandidat gepuffert");
    }

    /// Veroeffentlicht einen frischen Endpunkt an der Session
    ///
    /// Unter dem Raum-Lock wird die Queue der Verbindung in den Endpunkt-Task
    /// geleert, bevor der Endpunkt sichtbar wird. Spaetere Kandidaten landen
    /// dadurch immer hinter den gepufferten.
    async fn endpunkt_veroeffentlichen(
        &self,
        connection_id: ConnectionId,
        raum: &RaumHandle,
        generation: u64,
        endpunkt: MediaEndpoint,
        gueltig: impl Fn(&Room) -> bool,
    ) -> Result<EndpointId, Abbruch> {
        let MediaEndpoint { id, candidates } = endpunkt;
        let (zufuhr, zufuhr_rx) = mpsc::unbounded_channel();

        let geleert = {
            let mut r = raum.lock();
            if gueltig(&*r) {
                r.session_mit_generation(&connection_id, generation)
                    .map(|session| {
                        let wartend = self.registry.kandidaten().entnehmen(&connection_id);
                        let anzahl = wartend.len();
                        for kandidat in wartend {
                            let _ = zufuhr.send(kandidat);
                        }
                        session.endpunkt = Some(BereiterEndpunkt {
                            id: id.clone(),
                            zufuhr,
                        });
                        anzahl
                    })
            } else {
                None
            }
        };

        let Some(anzahl) = geleert else {
            self.freigeben(MediaObject::Endpoint(id)).await;
            return Err(Abbruch::Veraltet);
        };

        tracing::debug!(
            connection_id = %connection_id,
            endpoint = %id,
            gepuffert = anzahl,
            "Endpunkt bereit"
        );
        self.endpunkt_task_starten(connection_id, id.clone(), zufuhr_rx, candidates);
        Ok(id)
    }

    /// Task pro Endpunkt: Kandidaten zum Backend und vom Backend zum Client
    ///
    /// Endet, sobald die Session (und damit `zufuhr`) verworfen wird.
    fn endpunkt_task_starten(
        &self,
        connection_id: ConnectionId,
        endpoint_id: EndpointId,
        mut zufuhr: mpsc::UnboundedReceiver<IceCandidate>,
        mut gefunden: CandidateReceiver,
    ) {
        let gateway = Arc::clone(&self.gateway);
        let broadcaster = self.broadcaster.clone();

        tokio::spawn(async move {
            let mut backend_offen = true;
            loop {
                tokio::select! {
                    kandidat = zufuhr.recv() => match kandidat {
                        Some(kandidat) => {
                            if let Err(e) = gateway.add_candidate(&endpoint_id, kandidat).await {
                                tracing::warn!(
                                    connection_id = %connection_id,
                                    endpoint = %endpoint_id,
                                    fehler = %e,
                                    "Kandidat konnte nicht uebergeben werden"
                                );
                            }
                        }
                        None => break,
                    },
                    kandidat = gefunden.recv(), if backend_offen => match kandidat {
                        Some(candidate) => {
                            broadcaster.an_verbindung_senden(
                                &connection_id,
                                ServerEvent::IceCandidate { candidate },
                            );
                        }
                        None => backend_offen = false,
                    },
                }
            }
            tracing::trace!(endpoint = %endpoint_id, "Endpunkt-Task beendet");
        });
    }

    /// Startet `gather_candidates` im Hintergrund
    ///
    /// Ein Fehler baut die Session dieser Generation ab und wird dem Client
    /// als `error`-Event gemeldet.
    fn kandidatensuche_starten(
        &self,
        connection_id: ConnectionId,
        room: RoomName,
        raum: RaumHandle,
        generation: u64,
        endpoint_id: EndpointId,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            let Err(fehler) = controller.gateway.gather_candidates(&endpoint_id).await else {
                return;
            };
            tracing::warn!(
                connection_id = %connection_id,
                endpoint = %endpoint_id,
                fehler = %fehler,
                "Kandidatensuche fehlgeschlagen"
            );
            if controller
                .generation_abbauen(connection_id, &room, &raum, generation)
                .await
            {
                controller.broadcaster.an_verbindung_senden(
                    &connection_id,
                    ServerEvent::error(format!("Candidate gathering failed: {fehler}")),
                );
            }
        });
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Beendet die Session von `connection_id` in `room`
    ///
    /// Idempotent; eine unbekannte Verbindung ist ein No-op.
    pub async fn stop(&self, connection_id: ConnectionId, room: &RoomName) {
        self.registry.kandidaten().verwerfen(&connection_id);

        let Some(raum) = self.registry.get(room) else {
            return;
        };
        let abbau = raum.lock().verbindung_entfernen(&connection_id, None);
        if abbau.ist_leer() {
            tracing::trace!(connection_id = %connection_id, room = %room, "Keine Session zu beenden");
            return;
        }
        self.abbau_ausfuehren(connection_id, room, abbau).await;
    }

    /// Baut nur die Session genau dieser Generation ab
    ///
    /// Gibt `false` zurueck wenn sie bereits nicht mehr existierte.
    async fn generation_abbauen(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        raum: &RaumHandle,
        generation: u64,
    ) -> bool {
        let abbau = raum
            .lock()
            .verbindung_entfernen(&connection_id, Some(generation));
        if abbau.ist_leer() {
            return false;
        }
        self.registry.kandidaten().verwerfen(&connection_id);
        self.abbau_ausfuehren(connection_id, room, abbau).await;
        true
    }

    async fn abbau_ausfuehren(&self, connection_id: ConnectionId, room: &RoomName, abbau: Abbau) {
        let Some(rolle) = abbau.rolle else {
            return;
        };
        if rolle == Rolle::Presenter {
            self.metriken.presenters_active.dec();
        }
        self.metriken
            .viewers_active
            .sub(abbau.viewer_anzahl() as i64);

        for viewer in &abbau.benachrichtigen {
            self.registry.kandidaten().verwerfen(viewer);
            self.broadcaster
                .an_verbindung_senden(viewer, ServerEvent::StopCommunication);
        }

        let viewer = abbau.benachrichtigen.len();
        let endpunkte = abbau.endpunkte.len();
        for endpunkt in abbau.endpunkte {
            self.freigeben(MediaObject::Endpoint(endpunkt)).await;
        }
        if let Some(pipeline) = abbau.pipeline {
            self.freigeben(MediaObject::Pipeline(pipeline)).await;
        }

        tracing::info!(
            connection_id = %connection_id,
            room = %room,
            rolle = rolle.als_str(),
            viewer,
            endpunkte,
            "Session beendet"
        );
    }

    async fn abbruch_behandeln(
        &self,
        connection_id: ConnectionId,
        room: &RoomName,
        raum: &RaumHandle,
        generation: u64,
        abbruch: Abbruch,
    ) -> Rejection {
        match abbruch {
            Abbruch::Veraltet => {
                tracing::debug!(
                    connection_id = %connection_id,
                    room = %room,
                    generation,
                    "Fortsetzung veraltet – Session wurde zwischenzeitlich beendet"
                );
                Rejection::NoActivePresenter
            }
            Abbruch::Backend(fehler) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    room = %room,
                    fehler = %fehler,
                    "Backend-Fehler waehrend der Aushandlung"
                );
                if self
                    .generation_abbauen(connection_id, room, raum, generation)
                    .await
                {
                    Rejection::BackendFailure(fehler)
                } else {
                    Rejection::NoActivePresenter
                }
            }
        }
    }

    /// Gibt ein Backend-Objekt frei; Fehler werden nur geloggt
    async fn freigeben(&self, objekt: MediaObject) {
        let art = match &objekt {
            MediaObject::Pipeline(_) => "pipeline",
            MediaObject::Endpoint(_) => "endpoint",
        };
        let id = objekt.id().to_owned();
        if let Err(e) = self.gateway.release(objekt).await {
            tracing::warn!(object = %id, fehler = %e, "Freigabe fehlgeschlagen");
        }
        self.metriken
            .backend_releases_total
            .with_label_values(&[art])
            .inc();
    }

    fn aushandlung_zaehlen(&self, rolle: Rolle, ergebnis: &Result<String, Rejection>) {
        let label = match ergebnis {
            Ok(_) => "accepted",
            Err(grund) => grund.label(),
        };
        self.metriken.aushandlung(rolle.als_str(), label);
    }
}

/// Reserviert eine Viewer-Session, sofern ein bereiter Presenter existiert
fn viewer_reservieren(
    raum: &mut Room,
    connection_id: ConnectionId,
    generation: u64,
) -> Result<ViewerReservierung, Rejection> {
    if raum.ist_presenter(&connection_id) {
        return Err(Rejection::AlreadyPresenting);
    }
    let (presenter_generation, presenter_endpunkt) = raum
        .presenter()
        .and_then(|p| p.endpunkt_id().map(|ep| (p.generation, ep.clone())))
        .ok_or(Rejection::NoActivePresenter)?;
    let pipeline = raum
        .pipeline()
        .cloned()
        .ok_or(Rejection::NoActivePresenter)?;

    let alt = raum.viewer_reservieren(connection_id, generation);
    Ok(ViewerReservierung {
        pipeline,
        presenter_endpunkt,
        presenter_generation,
        ersetzt: alt.is_some(),
        alter_endpunkt: alt.and_then(|s| s.endpunkt).map(|e| e.id),
    })
}
