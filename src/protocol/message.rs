//! Wire messages for each transport.
//!
//! | Transport | Outbound | Inbound |
//! |-----------|----------|---------|
//! | HTTP | JSON object of parameters | `{"value": ...}` (or legacy `{"status", "value"}`) |
//! | Socket | [`LegacyRequest`] inside a `Length:` frame | `{"isError", "context", "value"}` |
//! | WebSocket | [`BidiRequest`] | [`IncomingMessage`]: reply or event |
//!
//! Every inbound payload is normalized into a [`RawReply`] before it reaches
//! the dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{CorrelationId, SessionId};

use super::Event;

// ============================================================================
// TransportKind
// ============================================================================

/// Transport variant, used to select wire rules and error extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Request/response HTTP+JSON.
    Http,
    /// Legacy `Length:`-framed raw socket.
    Socket,
    /// Persistent bidirectional WebSocket.
    WebSocket,
}

impl TransportKind {
    /// Returns the transport name for logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socket => "socket",
            Self::WebSocket => "websocket",
        }
    }

    /// Returns `true` if several requests may be outstanding at once.
    #[inline]
    #[must_use]
    pub const fn is_multiplexed(self) -> bool {
        matches!(self, Self::WebSocket)
    }

    /// Default deadline for one command.
    #[must_use]
    pub const fn default_command_timeout(self) -> Duration {
        match self {
            Self::Http | Self::Socket => Duration::from_secs(120),
            Self::WebSocket => Duration::from_secs(30),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// BidiRequest
// ============================================================================

/// Outbound WebSocket command.
///
/// # Format
///
/// ```json
/// { "id": 7, "method": "browsingContext.navigate", "params": { ... }, "sessionId": "..." }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct BidiRequest<'a> {
    /// Correlation id.
    pub id: CorrelationId,

    /// Command name.
    pub method: &'a str,

    /// Command parameters.
    pub params: Map<String, Value>,

    /// Session, once a handshake produced one.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a SessionId>,
}

// ============================================================================
// LegacyRequest
// ============================================================================

/// Outbound socket command body.
///
/// # Format
///
/// ```json
/// { "parameters": [...], "context": "ctx-1", "elementId": "null", "commandName": "click" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct LegacyRequest<'a> {
    /// Parameter values in insertion order.
    pub parameters: Vec<&'a Value>,

    /// Current context handle, `"null"` before one is known.
    pub context: &'a str,

    /// Target element, `"null"` when none.
    #[serde(rename = "elementId")]
    pub element_id: &'a str,

    /// Command name.
    #[serde(rename = "commandName")]
    pub command_name: &'a str,
}

// ============================================================================
// IncomingMessage
// ============================================================================

/// Classified inbound WebSocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Completion of a command: `{"id", "result"}` or `{"id", "error"}`.
    Reply {
        /// Correlation id of the originating command.
        id: CorrelationId,
        /// Whole reply object.
        payload: Value,
    },
    /// Unsolicited event: `{"method", "params"}` with no id.
    Event(Event),
}

impl IncomingMessage {
    /// Parses and classifies one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not JSON
    /// - [`Error::ProtocolViolation`] if it is neither a reply nor an event
    pub fn parse(text: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)?;

        if let Some(id) = payload.get("id").and_then(Value::as_u64) {
            return Ok(Self::Reply {
                id: CorrelationId::new(id),
                payload,
            });
        }

        if let Some(method) = payload.get("method").and_then(Value::as_str) {
            let params = payload.get("params").cloned().unwrap_or(Value::Null);
            return Ok(Self::Event(Event::new(method, params)));
        }

        Err(Error::protocol_violation(
            "message carries neither an id nor a method",
        ))
    }
}

// ============================================================================
// RawReply
// ============================================================================

/// One decoded reply, before error translation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    /// Transport that produced it.
    pub transport: TransportKind,
    /// HTTP status (HTTP transport only).
    pub status: Option<u16>,
    /// Decoded body.
    pub payload: Value,
}

impl RawReply {
    /// Creates a reply.
    #[inline]
    #[must_use]
    pub fn new(transport: TransportKind, status: Option<u16>, payload: Value) -> Self {
        Self {
            transport,
            status,
            payload,
        }
    }

    /// Returns `true` if the peer signalled failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        match self.transport {
            TransportKind::Http => {
                let bad_status = self.status.is_some_and(|s| !(200..300).contains(&s));
                let w3c_error = self
                    .payload
                    .get("value")
                    .and_then(|v| v.get("error"))
                    .is_some_and(|e| !e.is_null());
                let legacy_status = self
                    .payload
                    .get("status")
                    .and_then(Value::as_i64)
                    .is_some_and(|s| s != 0);
                bad_status || w3c_error || legacy_status
            }
            TransportKind::Socket => self
                .payload
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            TransportKind::WebSocket => self.payload.get("error").is_some_and(|e| !e.is_null()),
        }
    }

    /// Returns the success value: `result` for WebSocket, `value` otherwise.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self.transport {
            TransportKind::WebSocket => self.payload.get("result"),
            TransportKind::Http | TransportKind::Socket => self.payload.get("value"),
        }
    }

    /// Consumes the reply and returns the success value, or `null`.
    #[must_use]
    pub fn into_value(self) -> Value {
        let key = match self.transport {
            TransportKind::WebSocket => "result",
            TransportKind::Http | TransportKind::Socket => "value",
        };
        match self.payload {
            Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Returns the context handle the peer wants threaded into later commands.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self.transport {
            TransportKind::Socket => self.payload.get("context").and_then(Value::as_str),
            TransportKind::WebSocket | TransportKind::Http => self
                .value()
                .and_then(|v| v.get("context"))
                .and_then(Value::as_str),
        }
    }

    /// Returns the session id announced by a handshake reply.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.value()
            .and_then(|v| v.get("sessionId"))
            .or_else(|| self.payload.get("sessionId"))
            .and_then(Value::as_str)
            .map(SessionId::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_bidi_request_serialization() {
        let session = SessionId::new("s-1");
        let mut params = Map::new();
        params.insert("url".into(), json!("https://a.test"));

        let request = BidiRequest {
            id: CorrelationId::new(3),
            method: "browsingContext.navigate",
            params,
            session_id: Some(&session),
        };

        let json = serde_json::to_string(&request).expect("serialize");
        assert_eq!(
            json,
            r#"{"id":3,"method":"browsingContext.navigate","params":{"url":"https://a.test"},"sessionId":"s-1"}"#
        );
    }

    #[test]
    fn test_bidi_request_without_session() {
        let request = BidiRequest {
            id: CorrelationId::new(1),
            method: "session.new",
            params: Map::new(),
            session_id: None,
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(!json.contains("sessionId"));
    }

    #[test]
    fn test_legacy_request_field_order() {
        let a = json!("x");
        let b = json!(2);
        let request = LegacyRequest {
            parameters: vec![&a, &b],
            context: "ctx-1",
            element_id: "null",
            command_name: "click",
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert_eq!(
            json,
            r#"{"parameters":["x",2],"context":"ctx-1","elementId":"null","commandName":"click"}"#
        );
    }

    #[test]
    fn test_incoming_reply_and_event() {
        let reply = IncomingMessage::parse(r#"{"id":5,"result":{}}"#).expect("parse");
        assert!(matches!(reply, IncomingMessage::Reply { id, .. } if id == CorrelationId::new(5)));

        let event =
            IncomingMessage::parse(r#"{"method":"log.entryAdded","params":{"text":"hi"}}"#)
                .expect("parse");
        match event {
            IncomingMessage::Event(event) => assert_eq!(event.get_string("text"), "hi"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_incoming_rejects_unclassifiable() {
        let err = IncomingMessage::parse(r#"{"hello":1}"#).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation { .. }));
        assert!(IncomingMessage::parse("not json").is_err());
    }

    #[test]
    fn test_http_error_detection() {
        let ok = RawReply::new(TransportKind::Http, Some(200), json!({"value": 1}));
        let bad_status = RawReply::new(TransportKind::Http, Some(404), json!({"value": null}));
        let w3c = RawReply::new(
            TransportKind::Http,
            Some(200),
            json!({"value": {"error": "no such element"}}),
        );
        let legacy = RawReply::new(TransportKind::Http, Some(200), json!({"status": 7}));

        assert!(!ok.is_error());
        assert!(bad_status.is_error());
        assert!(w3c.is_error());
        assert!(legacy.is_error());
    }

    #[test]
    fn test_socket_reply_accessors() {
        let reply = RawReply::new(
            TransportKind::Socket,
            None,
            json!({"isError": false, "context": "ctx-1", "value": "ok", "sessionId": "abc"}),
        );
        assert!(!reply.is_error());
        assert_eq!(reply.context(), Some("ctx-1"));
        assert_eq!(reply.session_id(), Some(SessionId::new("abc")));
        assert_eq!(reply.into_value(), json!("ok"));
    }

    #[test]
    fn test_websocket_reply_accessors() {
        let reply = RawReply::new(
            TransportKind::WebSocket,
            None,
            json!({"id": 1, "result": {"sessionId": "bidi-1", "context": "top"}}),
        );
        assert!(!reply.is_error());
        assert_eq!(reply.session_id(), Some(SessionId::new("bidi-1")));
        assert_eq!(reply.context(), Some("top"));

        let failed = RawReply::new(
            TransportKind::WebSocket,
            None,
            json!({"id": 2, "error": "no such frame", "message": "gone"}),
        );
        assert!(failed.is_error());
    }

    #[test]
    fn test_into_value_defaults_to_null() {
        let reply = RawReply::new(TransportKind::Http, Some(200), json!("bare"));
        assert_eq!(reply.into_value(), Value::Null);
    }

    #[test]
    fn test_transport_kind_defaults() {
        assert!(TransportKind::WebSocket.is_multiplexed());
        assert!(!TransportKind::Socket.is_multiplexed());
        assert_eq!(
            TransportKind::Http.default_command_timeout(),
            Duration::from_secs(120)
        );
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
    }
}
