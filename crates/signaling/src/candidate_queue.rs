//! CandidateQueue – ICE-Kandidaten die vor dem Endpunkt eintreffen
//!
//! Pro Verbindung eine FIFO. Eintraege existieren nur solange der Endpunkt
//! der Verbindung noch nicht bereit ist; beim Entnehmen oder Verwerfen wird
//! der Eintrag geloescht, nicht nur geleert.

use dashmap::DashMap;
use onair_core::ConnectionId;
use onair_protocol::IceCandidate;
use std::collections::VecDeque;

/// Standard-Obergrenze gepufferter Kandidaten pro Verbindung
pub const STANDARD_MAX_KANDIDATEN: usize = 64;

/// Puffer fuer Kandidaten, indiziert nach Verbindung
#[derive(Debug)]
pub struct CandidateQueue {
    eintraege: DashMap<ConnectionId, VecDeque<IceCandidate>>,
    limit: usize,
}

impl CandidateQueue {
    /// Erstellt eine leere Queue mit `limit` Kandidaten pro Verbindung
    pub fn neu(limit: usize) -> Self {
        Self {
            eintraege: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Haengt einen Kandidaten an; legt den Eintrag bei Bedarf an
    ///
    /// Bei erreichtem Limit wird der aelteste Kandidat verworfen. Gibt `true`
    /// zurueck wenn dabei ein Kandidat verloren ging.
    pub fn einreihen(&self, connection_id: ConnectionId, candidate: IceCandidate) -> bool {
        let mut eintrag = self.eintraege.entry(connection_id).or_default();
        let verdraengt = if eintrag.len() >= self.limit {
            eintrag.pop_front();
            true
        } else {
            false
        };
        eintrag.push_back(candidate);

        if verdraengt {
            tracing::warn!(
                connection_id = %connection_id,
                limit = self.limit,
                "Kandidaten-Queue voll – aeltester Kandidat verworfen"
            );
        }
        verdraengt
    }

    /// Entnimmt alle Kandidaten in Ankunftsreihenfolge und loescht den Eintrag
    pub fn entnehmen(&self, connection_id: &ConnectionId) -> Vec<IceCandidate> {
        self.eintraege
            .remove(connection_id)
            .map(|(_, queue)| queue.into())
            .unwrap_or_default()
    }

    /// Loescht den Eintrag ohne die Kandidaten zu verwenden
    pub fn verwerfen(&self, connection_id: &ConnectionId) {
        self.eintraege.remove(connection_id);
    }

    /// Anzahl gepufferter Kandidaten einer Verbindung
    pub fn laenge(&self, connection_id: &ConnectionId) -> usize {
        self.eintraege
            .get(connection_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Ob fuer die Verbindung ein Eintrag existiert
    pub fn enthaelt(&self, connection_id: &ConnectionId) -> bool {
        self.eintraege.contains_key(connection_id)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::neu(STANDARD_MAX_KANDIDATEN)
    }
}
