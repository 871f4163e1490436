//! Console message handle.
//!
//! Created when a `log.entryAdded` event arrives for the page. Plain
//! data object; accessors read the entry payload lazily.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SourceLocation
// ============================================================================

/// Source location of a console call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Script URL.
    pub url: String,
    /// Zero-based line number.
    pub line_number: u64,
    /// Zero-based column number.
    pub column_number: u64,
}

// ============================================================================
// ConsoleMessage
// ============================================================================

/// One console message emitted by the page (`console.log`, `warn`,
/// `error`, ...).
#[derive(Clone)]
pub struct ConsoleMessage {
    data: Value,
}

impl ConsoleMessage {
    /// Creates a message handle from a `log.entryAdded` payload.
    pub(crate) fn new(data: Value) -> Self {
        Self { data }
    }

    /// The console method: `log`, `warn`, `error`, `debug`, `info`, ...
    #[must_use]
    pub fn kind(&self) -> &str {
        self.data
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("log")
    }

    /// The message text.
    #[must_use]
    pub fn text(&self) -> &str {
        self.data
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The serialized arguments passed to the console call.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        self.data
            .get("args")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The source location of the console call, if the entry carries a
    /// stack trace.
    #[must_use]
    pub fn location(&self) -> Option<SourceLocation> {
        let frame = self
            .data
            .get("stackTrace")?
            .get("callFrames")?
            .get(0)?;

        Some(SourceLocation {
            url: frame
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            line_number: frame
                .get("lineNumber")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            column_number: frame
                .get("columnNumber")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for ConsoleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleMessage")
            .field("kind", &self.kind())
            .field("text", &self.text())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
