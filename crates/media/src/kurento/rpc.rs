//! JSON-RPC 2.0 Nachrichten des Kurento Media Servers
//!
//! ## Anfragen
//! ```text
//! {"jsonrpc":"2.0","id":7,"method":"create","params":{"type":"MediaPipeline",...,"sessionId":"..."}}
//! {"jsonrpc":"2.0","id":8,"method":"invoke","params":{"object":"...","operation":"processOffer",
//!                                                    "operationParams":{"offer":"v=0..."}}}
//! ```
//!
//! ## Eingehend
//! - Antworten: `{"id":7,"result":{"value":"...","sessionId":"..."}}` oder `{"id":7,"error":{...}}`
//! - Events: `{"method":"onEvent","params":{"value":{"type":"OnIceCandidate","object":"...",
//!   "data":{"candidate":{...}}}}}`

use onair_protocol::IceCandidate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{MediaError, MediaResult};

/// Event-Typ fuer vom Endpunkt gefundene Kandidaten
pub const ICE_EVENT: &str = "OnIceCandidate";

/// Baut einen Anfrage-Frame
pub fn anfrage_frame(id: u64, method: &str, params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Parameter fuer `invoke`
pub fn invoke_params(object: &str, operation: &str, operation_params: Value) -> Value {
    json!({
        "object": object,
        "operation": operation,
        "operationParams": operation_params,
    })
}

/// Kandidat im Format des Kurento-Typs `IceCandidate`
pub fn kandidat_json(candidate: &IceCandidate) -> Value {
    json!({
        "__module__": "kurento",
        "__type__": "IceCandidate",
        "candidate": candidate.candidate,
        "sdpMid": candidate.sdp_mid.clone().unwrap_or_default(),
        "sdpMLineIndex": candidate.sdp_m_line_index.unwrap_or(0),
    })
}

/// Liest `result.value` als String (Objekt-ID oder SDP-Antwort)
pub fn wert_als_string(result: &Value) -> MediaResult<String> {
    result
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| MediaError::protokoll(format!("Antwort ohne 'value': {}", result)))
}

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Klassifizierte eingehende Nachricht
#[derive(Debug)]
pub enum Eingehend {
    /// Antwort auf eine eigene Anfrage
    Antwort {
        id: u64,
        ergebnis: MediaResult<Value>,
    },
    /// Vom Backend gefundener Kandidat fuer `object`
    Kandidat {
        object: String,
        candidate: IceCandidate,
    },
    /// Andere Events und Nachrichten (werden ignoriert)
    Sonstiges,
}

#[derive(Deserialize)]
struct RohNachricht {
    id: Option<u64>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RohFehler>,
}

#[derive(Deserialize)]
struct RohFehler {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct EventWert {
    #[serde(rename = "type")]
    typ: String,
    object: String,
    data: Value,
}

/// Klassifiziert einen eingehenden Textframe
pub fn eingehend_parsen(text: &str) -> MediaResult<Eingehend> {
    let roh: RohNachricht = serde_json::from_str(text)
        .map_err(|e| MediaError::protokoll(format!("Ungueltiges JSON-RPC: {}", e)))?;

    if let Some(id) = roh.id {
        if let Some(fehler) = roh.error {
            return Ok(Eingehend::Antwort {
                id,
                ergebnis: Err(MediaError::Rpc {
                    code: fehler.code,
                    message: fehler.message,
                }),
            });
        }
        if let Some(result) = roh.result {
            return Ok(Eingehend::Antwort {
                id,
                ergebnis: Ok(result),
            });
        }
    }

    if roh.method.as_deref() != Some("onEvent") {
        return Ok(Eingehend::Sonstiges);
    }

    let wert = roh
        .params
        .and_then(|mut p| p.get_mut("value").map(Value::take))
        .ok_or_else(|| MediaError::protokoll("onEvent ohne 'params.value'"))?;
    let event: EventWert = serde_json::from_value(wert)
        .map_err(|e| MediaError::protokoll(format!("Ungueltiges Event: {}", e)))?;

    if event.typ != ICE_EVENT {
        return Ok(Eingehend::Sonstiges);
    }

    let candidate = event
        .data
        .get("candidate")
        .cloned()
        .ok_or_else(|| MediaError::protokoll("Kandidaten-Event ohne 'candidate'"))
        .and_then(|c| {
            serde_json::from_value::<IceCandidate>(c)
                .map_err(|e| MediaError::protokoll(format!("Ungueltiger Kandidat: {}", e)))
        })?;

    Ok(Eingehend::Kandidat {
        object: event.object,
        candidate,
    })
}
