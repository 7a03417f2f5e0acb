//! Fehlertypen fuer den Signaling-Service

use onair_core::OnairError;
use onair_media::MediaError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Nachricht konnte nicht kodiert oder dekodiert werden
    #[error("Nachrichtenfehler: {0}")]
    Nachricht(#[from] OnairError),

    /// WebSocket-Fehler
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(#[from] axum::Error),
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

// ---------------------------------------------------------------------------
// Ablehnungsgruende fuer Aushandlungen
// ---------------------------------------------------------------------------

/// Grund fuer die Ablehnung einer `presenter`- oder `viewer`-Anfrage
///
/// Der `Display`-Text geht unveraendert als `message` an den Client.
#[derive(Debug, Clone, Error)]
pub enum Rejection {
    /// Im Raum ist bereits ein Presenter aktiv oder reserviert
    #[error("Another user is currently acting as presenter. Try again later ...")]
    PresenterConflict,

    /// Kein Presenter (mehr) aktiv; auch Ergebnis veralteter Fortsetzungen
    #[error("No active presenter. Try again later...")]
    NoActivePresenter,

    /// Das Medien-Backend hat einen Aufruf abgelehnt oder ist nicht erreichbar
    #[error("Media backend failure: {0}")]
    BackendFailure(#[from] MediaError),

    /// Aushandlung ohne vorheriges `joinRoom`/`subscribeToStream`
    #[error("Join a room before starting a stream")]
    NotInRoom,

    /// Der Presenter eines Raums kann dort nicht gleichzeitig Viewer sein
    #[error("You are already presenting in this room")]
    AlreadyPresenting,
}

impl Rejection {
    /// Label fuer Metriken
    pub fn label(&self) -> &'static str {
        match self {
            Self::PresenterConflict => "presenter_conflict",
            Self::NoActivePresenter => "no_active_presenter",
            Self::BackendFailure(_) => "backend_failure",
            Self::NotInRoom => "not_in_room",
            Self::AlreadyPresenting => "already_presenting",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ablehnungstexte_fuer_clients() {
        assert_eq!(
            Rejection::PresenterConflict.to_string(),
            "Another user is currently acting as presenter. Try again later ..."
        );
        assert_eq!(
            Rejection::NoActivePresenter.to_string(),
            "No active presenter. Try again later..."
        );
    }

    #[test]
    fn backend_fehler_wird_eingebettet() {
        let r: Rejection = MediaError::Getrennt.into();
        assert!(matches!(r, Rejection::BackendFailure(MediaError::Getrennt)));
        assert_eq!(r.label(), "backend_failure");
    }
}
