//! Browser entities: [`Browser`], [`Page`], and the event-backed
//! objects ([`Dialog`], [`Download`], [`Route`], [`WebSocketInfo`]).
//!
//! Everything here consumes [`crate::transport::Client::send`]
//! exclusively; none of it touches the correlation table or event
//! router internals.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `clock` | Fake clock control |
//! | `console` | Console message handle |
//! | `dialog` | User prompt handle |
//! | `download` | Download handle with terminal state |
//! | `launcher` | Browser process launcher (external collaborator) |
//! | `page` | Page navigation and event wiring |
//! | `route` | Network interception and data retrieval |
//! | `websocket` | Observed page WebSockets |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::transport::Client;

// ============================================================================
// Submodules
// ============================================================================

/// Fake clock control.
pub mod clock;

/// Console message handle.
pub mod console;

/// Dialog handle.
pub mod dialog;

/// Download handle.
pub mod download;

/// Browser process launcher.
pub mod launcher;

/// Page handle.
pub mod page;

/// Network interception.
pub mod route;

/// Observed page WebSockets.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use clock::Clock;
pub use console::{ConsoleMessage, SourceLocation};
pub use dialog::Dialog;
pub use download::{Download, DownloadEnd};
pub use launcher::{BrowserProcess, LaunchOptions};
pub use page::Page;
pub use route::{ContinueOptions, FulfillOptions, RequestInfo, ResponseInfo, Route};
pub use websocket::{CallbackId, Direction, WebSocketInfo};

// ============================================================================
// Browser
// ============================================================================

/// A launched browser with a live protocol connection.
///
/// Construct with [`Browser::launch`], or [`Browser::connect`] when a
/// browser process is already running.
pub struct Browser {
    client: Client,
    process: Mutex<Option<BrowserProcess>>,
}

impl Browser {
    /// Launches a browser process and connects to it.
    ///
    /// # Errors
    ///
    /// Returns launch errors from [`BrowserProcess::start`] and
    /// connection errors from [`Client::connect`].
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let process = BrowserProcess::start(&options).await?;
        let url = format!("ws://localhost:{}/session", process.port());

        let client = Client::connect(&url).await?;
        client.send("session.new", json!({ "capabilities": {} })).await?;

        info!(port = process.port(), "Browser launched");
        Ok(Self {
            client,
            process: Mutex::new(Some(process)),
        })
    }

    /// Connects to an already-running browser endpoint.
    ///
    /// The caller keeps ownership of the process lifecycle.
    ///
    /// # Errors
    ///
    /// Returns connection errors from [`Client::connect`].
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::connect(url).await?;
        client.send("session.new", json!({ "capabilities": {} })).await?;

        Ok(Self {
            client,
            process: Mutex::new(None),
        })
    }

    /// Returns the underlying protocol client.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the default page (first open browsing context).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Protocol`] if the browser reports no
    /// open contexts.
    pub async fn page(&self) -> Result<Page> {
        let mut pages = self.pages().await?;
        if pages.is_empty() {
            return Err(crate::Error::protocol("browser has no open pages"));
        }
        Ok(pages.remove(0))
    }

    /// Opens a new page (tab).
    pub async fn new_page(&self) -> Result<Page> {
        let result = self
            .client
            .send("browsingContext.create", json!({ "type": "tab" }))
            .await?;
        let context = result
            .get("context")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::Error::protocol("browsingContext.create without context"))?
            .to_string();

        debug!(context = %context, "Page created");
        Ok(Page::new(self.client.clone(), context))
    }

    /// Returns all open pages.
    pub async fn pages(&self) -> Result<Vec<Page>> {
        let result = self
            .client
            .send("browsingContext.getTree", json!({}))
            .await?;

        let contexts = result
            .get("contexts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(contexts
            .iter()
            .filter_map(|c| c.get("context").and_then(Value::as_str))
            .map(|context| Page::new(self.client.clone(), context.to_string()))
            .collect())
    }

    /// Closes the browser.
    ///
    /// Best-effort `browser.close` command, then connection shutdown,
    /// then process termination. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if !self.client.is_closed() {
            // The browser may exit before answering; either way the
            // connection is going down next.
            if let Err(e) = self.client.send("browser.close", json!({})).await {
                debug!(error = %e, "browser.close command failed");
            }
            self.client.close();
        }

        // No owned process when constructed via `connect`.
        if let Some(mut process) = self.process.lock().await.take() {
            process.terminate().await;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
