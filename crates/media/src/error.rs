//! Fehlertypen fuer das Medien-Backend

use thiserror::Error;

/// Fehler bei einem Aufruf ins Medien-Backend
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// Backend nicht erreichbar (Verbindungsaufbau fehlgeschlagen)
    #[error("Medien-Backend nicht erreichbar: {0}")]
    Verbindung(String),

    /// Verbindung zum Backend waehrend eines Aufrufs verloren
    #[error("Verbindung zum Medien-Backend getrennt")]
    Getrennt,

    /// Backend hat nicht rechtzeitig geantwortet
    #[error("Zeitlimit beim Aufruf '{0}' ueberschritten")]
    Zeitlimit(String),

    /// Backend hat den Aufruf mit einem Fehler beantwortet
    #[error("Backend-Fehler {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Antwort des Backends nicht verstaendlich
    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

impl MediaError {
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }
}

/// Result-Typ fuer Aufrufe ins Medien-Backend
pub type MediaResult<T> = Result<T, MediaError>;
