//! Raum-Chat mit begrenztem Verlauf

use onair_protocol::ChatMessage;
use std::collections::VecDeque;

/// Standard-Kapazitaet des Chat-Verlaufs pro Raum
pub const STANDARD_CHAT_KAPAZITAET: usize = 30;

/// Begrenzter Chat-Verlauf (FIFO, aelteste Nachricht faellt heraus)
#[derive(Debug, Clone)]
pub struct ChatLog {
    nachrichten: VecDeque<ChatMessage>,
    kapazitaet: usize,
}

impl ChatLog {
    pub fn neu(kapazitaet: usize) -> Self {
        Self {
            nachrichten: VecDeque::with_capacity(kapazitaet),
            kapazitaet,
        }
    }

    /// Haengt eine Nachricht an und verdraengt bei Bedarf die aelteste
    pub fn anhaengen(&mut self, nachricht: ChatMessage) {
        self.nachrichten.push_back(nachricht);
        while self.nachrichten.len() > self.kapazitaet {
            self.nachrichten.pop_front();
        }
    }

    /// Verlauf in chronologischer Reihenfolge
    pub fn nachrichten(&self) -> Vec<ChatMessage> {
        self.nachrichten.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nachrichten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nachrichten.is_empty()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::neu(STANDARD_CHAT_KAPAZITAET)
    }
}
