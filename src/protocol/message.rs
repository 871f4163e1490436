//! Envelope types and the incoming-message parser.
//!
//! The wire codec is stateless: outgoing [`CommandEnvelope`]s serialize to
//! one JSON text frame, incoming frames parse into either a
//! [`ResponseEnvelope`] (carries an `id`) or an [`EventEnvelope`] (no `id`).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// CommandEnvelope
// ============================================================================

/// A command from local end to remote end.
///
/// # Format
///
/// ```json
/// { "id": 3, "method": "vibium:page.navigate", "params": { ... } }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    /// Unique identifier for request/response correlation.
    pub id: CommandId,

    /// Method name in `module.methodName` format.
    pub method: String,

    /// Method parameters.
    pub params: Value,
}

impl CommandEnvelope {
    /// Creates a new command with a fresh auto-assigned id.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: CommandId::next(),
            method: method.into(),
            params,
        }
    }

    /// Creates a command with a specific id.
    #[inline]
    #[must_use]
    pub fn with_id(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// ResponseEnvelope
// ============================================================================

/// A response from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 3, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 3, "error": { "code": "no such frame", "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error data (if error).
    #[serde(default)]
    pub error: Option<ErrorData>,
}

impl ResponseEnvelope {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, mapping an error envelope to
    /// [`Error::Remote`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] with the wire code and message if the
    /// remote end answered with an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::remote(
                err.code.unwrap_or_else(|| "unknown error".to_string()),
                err.message,
            )),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ErrorData
// ============================================================================

/// The `error` object of an error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    /// Machine-readable error code. Some servers omit it.
    #[serde(default)]
    pub code: Option<String>,

    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// EventEnvelope
// ============================================================================

/// An unsolicited notification from remote end to local end.
///
/// Events carry no `id`. The `params` object usually includes a
/// `context` field naming the browsing context the event applies to.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Event method name, e.g. `browsingContext.userPromptOpened`.
    pub method: String,

    /// Event payload.
    #[serde(default)]
    pub params: Value,
}

impl EventEnvelope {
    /// Returns the browsing context this event applies to, if any.
    #[inline]
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.params.get("context").and_then(Value::as_str)
    }
}

// ============================================================================
// IncomingMessage
// ============================================================================

/// One parsed incoming frame: either a response or an event.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Frame carried an `id` — a command response.
    Response(ResponseEnvelope),
    /// Frame carried no `id` — an unsolicited event.
    Event(EventEnvelope),
}

impl IncomingMessage {
    /// Parses one text frame into a response or event envelope.
    ///
    /// The discriminator is the presence of the `id` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the frame is not valid JSON, or
    /// [`Error::Protocol`] if it is JSON of neither shape.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("id").is_some() {
            let response: ResponseEnvelope = serde_json::from_value(value)?;
            return Ok(Self::Response(response));
        }

        if value.get("method").is_some() {
            let event: EventEnvelope = serde_json::from_value(value)?;
            return Ok(Self::Event(event));
        }

        Err(Error::protocol(format!(
            "message is neither response nor event: {text}"
        )))
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
    fn test_command_serialization() {
        let command = CommandEnvelope::with_id(
            CommandId::from_raw(5),
            "vibium:page.navigate",
            json!({ "context": "ctx1", "url": "https://example.com" }),
        );

        let text = serde_json::to_string(&command).expect("serialize");
        let value: Value = serde_json::from_str(&text).expect("round trip");

        assert_eq!(value["id"], 5);
        assert_eq!(value["method"], "vibium:page.navigate");
        assert_eq!(value["params"]["url"], "https://example.com");
    }

    #[test]
    fn test_parse_success_response() {
        let msg = IncomingMessage::parse(r#"{"id":1,"result":{"ok":true}}"#).expect("parse");

        let IncomingMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert_eq!(response.id, CommandId::from_raw(1));
        assert!(!response.is_error());
        assert_eq!(response.into_result().expect("result"), json!({"ok": true}));
    }

    #[test]
    fn test_parse_error_response() {
        let msg = IncomingMessage::parse(
            r#"{"id":2,"error":{"code":"no such alert","message":"dialog already closed"}}"#,
        )
        .expect("parse");

        let IncomingMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert!(response.is_error());

        let err = response.into_result().expect_err("error envelope");
        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(err.remote_message(), Some("dialog already closed"));
    }

    #[test]
    fn test_parse_error_response_without_code() {
        let msg = IncomingMessage::parse(r#"{"id":3,"error":{"message":"boom"}}"#).expect("parse");

        let IncomingMessage::Response(response) = msg else {
            panic!("expected response");
        };
        let err = response.into_result().expect_err("error envelope");
        assert_eq!(err.to_string(), "Remote error [unknown error]: boom");
    }

    #[test]
    fn test_parse_event() {
        let msg = IncomingMessage::parse(
            r#"{"method":"browsingContext.userPromptOpened","params":{"context":"ctx1","type":"alert"}}"#,
        )
        .expect("parse");

        let IncomingMessage::Event(event) = msg else {
            panic!("expected event");
        };
        assert_eq!(event.method, "browsingContext.userPromptOpened");
        assert_eq!(event.context(), Some("ctx1"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = IncomingMessage::parse("not json").expect_err("invalid");
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_parse_unrecognized_shape() {
        let err = IncomingMessage::parse(r#"{"hello":"world"}"#).expect_err("anomaly");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_null_result_maps_to_null() {
        let msg = IncomingMessage::parse(r#"{"id":9}"#).expect("parse");
        let IncomingMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert_eq!(response.into_result().expect("result"), Value::Null);
    }
}
