//! Raeume, Sessions und die RoomRegistry
//!
//! Ein `Room` haelt hoechstens einen Presenter, beliebig viele Viewer, die
//! gemeinsame Pipeline und den Chat-Verlauf. Jeder Raum liegt hinter einem
//! eigenen `parking_lot::Mutex`, der nie ueber einen `.await` gehalten wird.
//!
//! ## Generationen
//! Jede Session traegt die Generation, die bei ihrer Reservierung vergeben
//! wurde. Eine asynchrone Fortsetzung ist nur gueltig, solange die Session
//! mit genau dieser Generation noch im Raum steht.

use dashmap::DashMap;
use onair_core::{ConnectionId, RoomName};
use onair_media::{EndpointId, PipelineId};
use onair_protocol::IceCandidate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::candidate_queue::CandidateQueue;
use crate::chat::ChatLog;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Rolle einer Session im Raum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolle {
    Presenter,
    Viewer,
}

impl Rolle {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Presenter => "presenter",
            Self::Viewer => "viewer",
        }
    }
}

/// Bereiter Endpunkt einer Session
///
/// `zufuhr` speist den Endpunkt-Task, der Kandidaten der Gegenseite der
/// Reihe nach an das Backend uebergibt. Wird die Session verworfen, schliesst
/// der Kanal und der Task endet.
#[derive(Debug)]
pub struct BereiterEndpunkt {
    pub id: EndpointId,
    pub zufuhr: mpsc::UnboundedSender<IceCandidate>,
}

/// Serverseitiger Zustand eines Teilnehmers in seiner Rolle
#[derive(Debug)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub generation: u64,
    /// `None` bis die Aushandlung den Endpunkt veroeffentlicht
    pub endpunkt: Option<BereiterEndpunkt>,
}

impl Session {
    /// Platzhalter ohne Endpunkt (Slot reserviert)
    pub fn reserviert(connection_id: ConnectionId, generation: u64) -> Self {
        Self {
            connection_id,
            generation,
            endpunkt: None,
        }
    }

    pub fn endpunkt_id(&self) -> Option<&EndpointId> {
        self.endpunkt.as_ref().map(|e| &e.id)
    }
}

// ---------------------------------------------------------------------------
// Abbau
// ---------------------------------------------------------------------------

/// Ergebnis eines synchronen Abbaus im Raum
///
/// Der Zustand ist bereits bereinigt; die Freigaben beim Backend und die
/// Benachrichtigungen fuehrt der Aufrufer nach dem Entsperren aus.
#[derive(Debug, Default)]
pub struct Abbau {
    pub rolle: Option<Rolle>,
    /// Freizugebende Endpunkte (Viewer zuerst, Presenter zuletzt)
    pub endpunkte: Vec<EndpointId>,
    pub pipeline: Option<PipelineId>,
    /// Viewer, die `stopCommunication` erhalten
    pub benachrichtigen: Vec<ConnectionId>,
}

impl Abbau {
    /// Ob ueberhaupt eine Session entfernt wurde
    pub fn ist_leer(&self) -> bool {
        self.rolle.is_none()
    }

    /// Anzahl entfernter Viewer-Sessions
    pub fn viewer_anzahl(&self) -> usize {
        match self.rolle {
            Some(Rolle::Presenter) => self.benachrichtigen.len(),
            Some(Rolle::Viewer) => 1,
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Zustand eines Raums
#[derive(Debug)]
pub struct Room {
    name: RoomName,
    presenter: Option<Session>,
    pipeline: Option<PipelineId>,
    viewers: HashMap<ConnectionId, Session>,
    chat: ChatLog,
}

impl Room {
    pub fn neu(name: RoomName, chat_kapazitaet: usize) -> Self {
        Self {
            name,
            presenter: None,
            pipeline: None,
            viewers: HashMap::new(),
            chat: ChatLog::neu(chat_kapazitaet),
        }
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn presenter(&self) -> Option<&Session> {
        self.presenter.as_ref()
    }

    pub fn pipeline(&self) -> Option<&PipelineId> {
        self.pipeline.as_ref()
    }

    pub fn viewer(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.viewers.get(connection_id)
    }

    pub fn viewer_anzahl(&self) -> usize {
        self.viewers.len()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatLog {
        &mut self.chat
    }

    pub fn hat_presenter(&self) -> bool {
        self.presenter.is_some()
    }

    pub fn ist_presenter(&self, connection_id: &ConnectionId) -> bool {
        self.presenter
            .as_ref()
            .is_some_and(|p| p.connection_id == *connection_id)
    }

    /// Presenter mit veroeffentlichtem Endpunkt und Pipeline
    pub fn presenter_bereit(&self) -> bool {
        self.pipeline.is_some()
            && self
                .presenter
                .as_ref()
                .is_some_and(|p| p.endpunkt.is_some())
    }

    // -----------------------------------------------------------------------
    // Reservierung und Gueltigkeit
    // -----------------------------------------------------------------------

    /// Reserviert den Presenter-Slot; `false` wenn er belegt ist
    pub fn presenter_reservieren(&mut self, connection_id: ConnectionId, generation: u64) -> bool {
        if self.presenter.is_some() {
            return false;
        }
        self.presenter = Some(Session::reserviert(connection_id, generation));
        true
    }

    /// Reserviert eine Viewer-Session und gibt eine ersetzte alte zurueck
    pub fn viewer_reservieren(
        &mut self,
        connection_id: ConnectionId,
        generation: u64,
    ) -> Option<Session> {
        self.viewers
            .insert(connection_id, Session::reserviert(connection_id, generation))
    }

    pub fn presenter_gueltig(&self, connection_id: &ConnectionId, generation: u64) -> bool {
        self.presenter
            .as_ref()
            .is_some_and(|p| p.connection_id == *connection_id && p.generation == generation)
    }

    pub fn viewer_gueltig(&self, connection_id: &ConnectionId, generation: u64) -> bool {
        self.viewers
            .get(connection_id)
            .is_some_and(|v| v.generation == generation)
    }

    /// Session einer Verbindung (Presenter oder Viewer)
    pub fn session(&self, connection_id: &ConnectionId) -> Option<&Session> {
        match self.presenter.as_ref() {
            Some(p) if p.connection_id == *connection_id => Some(p),
            _ => self.viewers.get(connection_id),
        }
    }

    pub fn session_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Session> {
        match self.presenter.as_mut() {
            Some(p) if p.connection_id == *connection_id => Some(p),
            _ => self.viewers.get_mut(connection_id),
        }
    }

    /// Session mit passender Generation (fuer Fortsetzungen)
    pub fn session_mit_generation(
        &mut self,
        connection_id: &ConnectionId,
        generation: u64,
    ) -> Option<&mut Session> {
        self.session_mut(connection_id)
            .filter(|s| s.generation == generation)
    }

    /// Speichert die Pipeline des reservierten Presenters
    pub fn pipeline_setzen(&mut self, pipeline: PipelineId) {
        self.pipeline = Some(pipeline);
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Entfernt die Session einer Verbindung aus dem Raum
    ///
    /// Mit `nur_generation` wird nur eine Session genau dieser Generation
    /// entfernt. Ein Presenter nimmt alle Viewer und die Pipeline mit.
    pub fn verbindung_entfernen(
        &mut self,
        connection_id: &ConnectionId,
        nur_generation: Option<u64>,
    ) -> Abbau {
        let passt = |s: &Session| {
            s.connection_id == *connection_id && nur_generation.map_or(true, |g| s.generation == g)
        };

        if self.presenter.as_ref().is_some_and(|s| passt(s)) {
            let mut abbau = Abbau {
                rolle: Some(Rolle::Presenter),
                ..Abbau::default()
            };
            for (viewer_id, viewer) in self.viewers.drain() {
                if let Some(ep) = viewer.endpunkt {
                    abbau.endpunkte.push(ep.id);
                }
                abbau.benachrichtigen.push(viewer_id);
            }
            if let Some(ep) = self.presenter.take().and_then(|p| p.endpunkt) {
                abbau.endpunkte.push(ep.id);
            }
            abbau.pipeline = self.pipeline.take();
            return abbau;
        }

        let viewer_passt = self.viewers.get(connection_id).is_some_and(|s| passt(s));
        if viewer_passt {
            let mut abbau = Abbau {
                rolle: Some(Rolle::Viewer),
                ..Abbau::default()
            };
            if let Some(ep) = self
                .viewers
                .remove(connection_id)
                .and_then(|v| v.endpunkt)
            {
                abbau.endpunkte.push(ep.id);
            }
            return abbau;
        }

        Abbau::default()
    }
}

// ---------------------------------------------------------------------------
// RoomRegistry
// ---------------------------------------------------------------------------

/// Geteilter Zeiger auf einen Raum
pub type RaumHandle = Arc<Mutex<Room>>;

/// Prozessweite Registry aller Raeume
///
/// Raeume werden beim ersten Zugriff angelegt und nie entfernt. Die
/// Kandidaten-Queue gehoert der Registry, nicht den Sessions.
#[derive(Debug)]
pub struct RoomRegistry {
    raeume: DashMap<RoomName, RaumHandle>,
    kandidaten: CandidateQueue,
    generation: AtomicU64,
    chat_kapazitaet: usize,
}

impl RoomRegistry {
    pub fn neu(max_kandidaten: usize, chat_kapazitaet: usize) -> Self {
        Self {
            raeume: DashMap::new(),
            kandidaten: CandidateQueue::neu(max_kandidaten),
            generation: AtomicU64::new(1),
            chat_kapazitaet,
        }
    }

    /// Liefert den Raum oder legt ihn leer an
    pub fn get_or_create(&self, name: &RoomName) -> RaumHandle {
        if let Some(raum) = self.raeume.get(name) {
            return Arc::clone(raum.value());
        }
        let raum = self
            .raeume
            .entry(name.clone())
            .or_insert_with(|| {
                tracing::debug!(room = %name, "Raum angelegt");
                Arc::new(Mutex::new(Room::neu(name.clone(), self.chat_kapazitaet)))
            });
        Arc::clone(raum.value())
    }

    /// Liefert einen bestehenden Raum ohne ihn anzulegen
    pub fn get(&self, name: &RoomName) -> Option<RaumHandle> {
        self.raeume.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Vergibt eine neue, prozessweit eindeutige Generation
    pub fn naechste_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    pub fn kandidaten(&self) -> &CandidateQueue {
        &self.kandidaten
    }

    pub fn raum_anzahl(&self) -> usize {
        self.raeume.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::neu(
            crate::candidate_queue::STANDARD_MAX_KANDIDATEN,
            crate::chat::STANDARD_CHAT_KAPAZITAET,
        )
    }
}
