//! vibium - Browser automation client for a BiDi-style control protocol.
//!
//! This library talks to a vibium browser process over a single
//! WebSocket connection carrying JSON envelopes: commands with
//! correlated responses, plus unsolicited events.
//!
//! # Architecture
//!
//! - **Local End (Rust)**: sends commands, receives responses and events
//! - **Remote End (browser process)**: executes commands, emits events
//!
//! Key design principles:
//!
//! - One [`Client`] owns one connection, one receive loop, one
//!   correlation table and one event router
//! - Protocol uses `module.methodName` format; `vibium:`-prefixed
//!   methods are vendor extensions
//! - Event-backed objects ([`Dialog`], [`Download`], [`Route`],
//!   [`WebSocketInfo`]) subscribe at construction and resolve once
//!   their event fires
//! - The blocking façade in [`sync`] reuses the non-blocking client
//!   through one background runtime, never duplicating protocol logic
//!
//! # Quick Start
//!
//! ```no_run
//! use vibium::{Browser, LaunchOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let browser = Browser::launch(LaunchOptions::new().headless()).await?;
//!     let page = browser.page().await?;
//!
//!     page.go("https://example.com").await?;
//!     println!("Page title: {}", page.title().await?);
//!
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Browser, Page, and event-backed objects |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe id wrappers |
//! | [`protocol`] | Wire envelope types (internal) |
//! | [`sync`] | Blocking façade and the runtime bridge |
//! | [`transport`] | Protocol client, correlation, event routing |

// ============================================================================
// Modules
// ============================================================================

/// Browser entities: Browser, Page, Dialog, Download, Route, WebSocketInfo.
pub mod browser;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// Wire protocol message types.
///
/// Internal module defining command/response/event envelopes.
pub mod protocol;

/// Blocking façade over the non-blocking client.
pub mod sync;

/// WebSocket transport layer.
///
/// Internal module with the protocol client, correlation table and
/// event router.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    Browser, CallbackId, Clock, ConsoleMessage, ContinueOptions, Dialog, Direction, Download,
    DownloadEnd, FulfillOptions, LaunchOptions, Page, RequestInfo, ResponseInfo, Route,
    SourceLocation, WebSocketInfo,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, SubscriptionId};

// Transport types
pub use transport::Client;
