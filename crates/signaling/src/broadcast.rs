//! Event-Broadcaster – Sendet ServerEvents an Verbindungen und Raeume
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen Clients
//! und die Raum-Mitgliedschaft fuer selektives Broadcasting.
//!
//! ## Selektives Broadcasting
//! - An eine Verbindung: `an_verbindung_senden`
//! - An einen Raum: `an_raum_senden`
//! - An einen Raum ausser einer Verbindung: `an_raum_ausser_senden`

use dashmap::DashMap;
use onair_core::{ConnectionId, RoomName};
use onair_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard-Groesse der Send-Queue pro Verbindung
pub const STANDARD_SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ClientSender {
    /// Sendet ein Event nicht-blockierend
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event = ?event,
                    "Send-Queue voll – Event verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    /// Raum-Mitgliedschaft: room -> Verbindungen
    raum_mitglieder: DashMap<RoomName, Vec<ConnectionId>>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    /// Erstellt einen Broadcaster mit `queue_groesse` Events pro Verbindung
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                raum_mitglieder: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn verbindung_registrieren(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner
            .clients
            .insert(connection_id, ClientSender { connection_id, tx });
        tracing::debug!(connection_id = %connection_id, "Verbindung im Broadcaster registriert");
        rx
    }

    /// Entfernt eine Verbindung samt Raum-Mitgliedschaft
    pub fn verbindung_entfernen(&self, connection_id: &ConnectionId) {
        self.inner.clients.remove(connection_id);
        self.raum_verlassen(connection_id);
        tracing::debug!(connection_id = %connection_id, "Verbindung aus Broadcaster entfernt");
    }

    /// Fuegt eine Verbindung einem Raum hinzu (verlaesst vorher alle anderen)
    pub fn raum_beitreten(&self, connection_id: ConnectionId, room: RoomName) {
        self.raum_verlassen(&connection_id);
        self.inner
            .raum_mitglieder
            .entry(room)
            .or_default()
            .push(connection_id);
    }

    /// Entfernt eine Verbindung aus ihrem Raum
    pub fn raum_verlassen(&self, connection_id: &ConnectionId) {
        self.inner.raum_mitglieder.iter_mut().for_each(|mut entry| {
            entry.value_mut().retain(|c| c != connection_id);
        });
        self.inner
            .raum_mitglieder
            .retain(|_, mitglieder| !mitglieder.is_empty());
    }

    /// Sendet ein Event an eine einzelne Verbindung
    pub fn an_verbindung_senden(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        match self.inner.clients.get(connection_id) {
            Some(sender) => sender.senden(event),
            None => {
                tracing::debug!(connection_id = %connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet ein Event an alle Mitglieder eines Raums
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_raum_senden(&self, room: &RoomName, event: ServerEvent) -> usize {
        self.an_raum_filtern(room, None, event)
    }

    /// Sendet ein Event an alle Mitglieder eines Raums ausser `ausgeschlossen`
    pub fn an_raum_ausser_senden(
        &self,
        room: &RoomName,
        ausgeschlossen: &ConnectionId,
        event: ServerEvent,
    ) -> usize {
        self.an_raum_filtern(room, Some(ausgeschlossen), event)
    }

    fn an_raum_filtern(
        &self,
        room: &RoomName,
        ausgeschlossen: Option<&ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        // Liste kopieren, damit kein DashMap-Guard waehrend des Sendens lebt
        let mitglieder = match self.inner.raum_mitglieder.get(room) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        mitglieder
            .iter()
            .filter(|c| Some(*c) != ausgeschlossen)
            .filter_map(|c| self.inner.clients.get(c))
            .filter(|sender| sender.senden(event.clone()))
            .count()
    }

    pub fn verbindung_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(connection_id)
    }

    /// Alle Verbindungen in einem Raum
    pub fn verbindungen_im_raum(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.inner
            .raum_mitglieder
            .get(room)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu(STANDARD_SEND_QUEUE_GROESSE)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
