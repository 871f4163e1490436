//! Error types for the vibium client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vibium::{Result, Error};
//!
//! async fn example(page: &Page) -> Result<()> {
//!     page.go("https://example.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Launch | [`Error::BinaryNotFound`], [`Error::LaunchFailed`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Remote`], [`Error::Protocol`] |
//! | Execution | [`Error::Timeout`], [`Error::RequestTimeout`], [`Error::DownloadFailed`] |
//! | Bridge | [`Error::NotStarted`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Launch Errors
    // ========================================================================
    /// Browser binary not found at path.
    ///
    /// Returned when no vibium binary could be located.
    #[error("vibium binary not found at: {path}")]
    BinaryNotFound {
        /// Path where the binary was expected.
        path: PathBuf,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    LaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the handshake cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout during handshake.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while commands were outstanding.
    ///
    /// Every pending command is failed with this variant on loss.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The remote end answered a command with an error envelope.
    ///
    /// Carries the wire-level error code and message unchanged.
    #[error("Remote error [{code}]: {message}")]
    Remote {
        /// Error code from the `error.code` field.
        code: String,
        /// Human-readable message from the `error.message` field.
        message: String,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Command timed out waiting for its response.
    ///
    /// The local wait is cancelled; remote execution is not. A response
    /// arriving after this fires is discarded.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command id that timed out.
        id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A download reached a terminal state other than `complete`.
    #[error("Download failed with status: {status}")]
    DownloadFailed {
        /// Terminal status reported by the downloadEnd event.
        status: String,
    },

    // ========================================================================
    // Bridge Errors
    // ========================================================================
    /// The synchronous bridge was used before `start()`.
    #[error("Sync bridge not started")]
    NotStarted,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a binary not found error.
    #[inline]
    pub fn binary_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BinaryNotFound { path: path.into() }
    }

    /// Creates a launch failed error.
    #[inline]
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a remote error from the wire `error` object fields.
    #[inline]
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CommandId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }

    /// Creates a download failed error.
    #[inline]
    pub fn download_failed(status: impl Into<String>) -> Self {
        Self::DownloadFailed {
            status: status.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is an error envelope from the remote end.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns the remote error message, if this is a remote error.
    ///
    /// Used by the race allow-lists on event-backed objects, which match
    /// on message text. Structured codes would be preferable; the current
    /// servers only populate free-form messages.
    #[inline]
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_remote_error_display() {
        let err = Error::remote("no such alert", "no such alert: dialog gone");
        assert_eq!(
            err.to_string(),
            "Remote error [no such alert]: no such alert: dialog gone"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 1000 };
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::protocol("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_remote_message() {
        let remote = Error::remote("invalid argument", "no such request");
        assert_eq!(remote.remote_message(), Some("no such request"));
        assert_eq!(Error::ConnectionClosed.remote_message(), None);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
