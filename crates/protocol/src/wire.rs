//! Wire-Format fuer WebSocket-Verbindungen
//!
//! Jeder WebSocket-Textframe enthaelt genau ein JSON-Objekt. Die maximale
//! Frame-Groesse ist konfigurierbar (Standard: 64 KB – SDP-Angebote mit
//! vielen Medienzeilen bleiben deutlich darunter).

use onair_core::{OnairError, Result};

use crate::control::{ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (64 KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// Codec fuer JSON-Textframes
///
/// Dekodiert eingehende `ClientEvent`s und kodiert ausgehende `ServerEvent`s.
#[derive(Debug, Clone)]
pub struct TextCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl TextCodec {
    /// Erstellt einen neuen `TextCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `TextCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Dekodiert einen eingehenden Textframe
    ///
    /// # Fehler
    /// - `NachrichtZuGross` wenn der Frame das Limit ueberschreitet
    /// - `UngueltigeNachricht` bei ungueltigem JSON oder unbekanntem Event
    pub fn decode(&self, frame: &str) -> Result<ClientEvent> {
        if frame.len() > self.max_frame_size {
            return Err(OnairError::NachrichtZuGross {
                groesse: frame.len(),
                maximum: self.max_frame_size,
            });
        }

        serde_json::from_str(frame).map_err(|e| {
            OnairError::ungueltig(format!("JSON-Deserialisierung fehlgeschlagen: {}", e))
        })
    }

    /// Kodiert ein ausgehendes Event als Textframe
    pub fn encode(&self, event: &ServerEvent) -> Result<String> {
        let json = serde_json::to_string(event).map_err(|e| {
            OnairError::intern(format!("JSON-Serialisierung fehlgeschlagen: {}", e))
        })?;

        if json.len() > self.max_frame_size {
            return Err(OnairError::NachrichtZuGross {
                groesse: json.len(),
                maximum: self.max_frame_size,
            });
        }

        Ok(json)
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NegotiationResponse;

    #[test]
    fn decode_stop() {
        let codec = TextCodec::new();
        let event = codec.decode(r#"{"id":"stop"}"#).unwrap();
        assert_eq!(event, ClientEvent::Stop);
    }

    #[test]
    fn decode_ungueltiges_json() {
        let codec = TextCodec::new();
        let err = codec.decode("{nicht json").unwrap_err();
        assert!(matches!(err, OnairError::UngueltigeNachricht(_)));
    }

    #[test]
    fn decode_ablehnung_zu_grosser_frame() {
        let codec = TextCodec::with_max_size(16);
        let err = codec
            .decode(r#"{"id":"presenter","sdpOffer":"v=0 ................"}"#)
            .unwrap_err();
        assert!(matches!(err, OnairError::NachrichtZuGross { maximum: 16, .. }));
    }

    #[test]
    fn encode_ablehnung_zu_grosse_nachricht() {
        let codec = TextCodec::with_max_size(10);
        let event = ServerEvent::PresenterResponse(NegotiationResponse::accepted("v=0"));
        assert!(codec.encode(&event).is_err());
    }

    #[test]
    fn encode_liefert_json_mit_id() {
        let codec = TextCodec::new();
        let frame = codec.encode(&ServerEvent::JoinedRoom).unwrap();
        assert_eq!(frame, r#"{"id":"joinedRoom"}"#);
    }

    #[test]
    fn default_max_size() {
        assert_eq!(TextCodec::new().max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }
}
