//! Blocking wrappers for the event-backed objects.
//!
//! Handlers registered through the blocking [`super::Page`] run on the
//! bridge's runtime thread, so they must not call back into
//! [`super::SyncBridge::run`]. Dialog and route handlers therefore use
//! a decision pattern: the handler records a decision synchronously and
//! the wiring applies it as a spawned task after the handler returns.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::browser::{Clock as AsyncClock, ContinueOptions, Dialog as AsyncDialog,
    Download as AsyncDownload, DownloadEnd, FulfillOptions, RequestInfo,
    ResponseInfo, Route as AsyncRoute};
use crate::error::Result;

use super::bridge::SyncBridge;

// ============================================================================
// Dialog
// ============================================================================

/// Decision recorded by a dialog handler.
#[derive(Debug, Clone)]
pub(crate) enum DialogDecision {
    Accept(Option<String>),
    Dismiss,
}

/// Blocking dialog handle using the decision pattern.
///
/// The handler calls [`accept`](Self::accept) or
/// [`dismiss`](Self::dismiss); if neither is called the dialog is
/// dismissed. The decision is applied after the handler returns.
pub struct Dialog {
    inner: AsyncDialog,
    decision: Mutex<DialogDecision>,
}

impl Dialog {
    pub(crate) fn new(inner: AsyncDialog) -> Self {
        Self {
            inner,
            decision: Mutex::new(DialogDecision::Dismiss),
        }
    }

    /// The dialog type: `alert`, `confirm`, `prompt`, or `beforeunload`.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.inner.kind()
    }

    /// The dialog message text.
    #[must_use]
    pub fn message(&self) -> &str {
        self.inner.message()
    }

    /// The default value for prompt dialogs.
    #[must_use]
    pub fn default_value(&self) -> &str {
        self.inner.default_value()
    }

    /// Records an accept decision, optionally with prompt text.
    pub fn accept(&self, prompt_text: Option<&str>) {
        *self.decision.lock() = DialogDecision::Accept(prompt_text.map(str::to_string));
    }

    /// Records a dismiss decision (the default).
    pub fn dismiss(&self) {
        *self.decision.lock() = DialogDecision::Dismiss;
    }

    /// Applies the recorded decision. Called by the page wiring on the
    /// runtime thread, after the user handler has returned.
    pub(crate) fn apply(self) {
        let decision = self.decision.into_inner();
        let dialog = self.inner;
        tokio::spawn(async move {
            let outcome = match decision {
                DialogDecision::Accept(text) => dialog.accept(text.as_deref()).await,
                DialogDecision::Dismiss => dialog.dismiss().await,
            };
            if let Err(e) = outcome {
                warn!(error = %e, "Dialog decision failed");
            }
        });
    }
}

// ============================================================================
// Route
// ============================================================================

/// Decision recorded by a route handler.
#[derive(Debug, Clone)]
pub(crate) enum RouteDecision {
    Fulfill(FulfillOptions),
    Continue(ContinueOptions),
    Abort,
}

/// Blocking route handle using the decision pattern.
///
/// The handler calls one of [`fulfill`](Self::fulfill),
/// [`continue_request`](Self::continue_request) or
/// [`abort`](Self::abort); if none is called the request continues
/// unchanged.
pub struct Route {
    inner: AsyncRoute,
    decision: Mutex<RouteDecision>,
}

impl Route {
    pub(crate) fn new(inner: AsyncRoute) -> Self {
        Self {
            inner,
            decision: Mutex::new(RouteDecision::Continue(ContinueOptions::default())),
        }
    }

    /// The intercepted request.
    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        self.inner.request()
    }

    /// Records a fulfill decision.
    pub fn fulfill(&self, options: FulfillOptions) {
        *self.decision.lock() = RouteDecision::Fulfill(options);
    }

    /// Records a continue decision (the default).
    pub fn continue_request(&self, options: ContinueOptions) {
        *self.decision.lock() = RouteDecision::Continue(options);
    }

    /// Records an abort decision.
    pub fn abort(&self) {
        *self.decision.lock() = RouteDecision::Abort;
    }

    /// Applies the recorded decision on the runtime thread.
    pub(crate) fn apply(self) {
        let decision = self.decision.into_inner();
        let route = self.inner;
        tokio::spawn(async move {
            let outcome = match decision {
                RouteDecision::Fulfill(options) => route.fulfill(options).await,
                RouteDecision::Continue(options) => route.continue_request(options).await,
                RouteDecision::Abort => route.abort().await,
            };
            if let Err(e) = outcome {
                warn!(error = %e, "Route decision failed");
            }
        });
    }
}

// ============================================================================
// Download
// ============================================================================

/// Blocking download handle.
///
/// Received by a download handler; the waiting methods block the
/// calling thread and must be used from outside the handler itself.
#[derive(Clone)]
pub struct Download {
    inner: AsyncDownload,
    bridge: Arc<SyncBridge>,
}

impl Download {
    pub(crate) fn new(inner: AsyncDownload, bridge: Arc<SyncBridge>) -> Self {
        Self { inner, bridge }
    }

    /// The URL the download was fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.url()
    }

    /// The filename suggested by the server or page.
    #[must_use]
    pub fn suggested_filename(&self) -> &str {
        self.inner.suggested_filename()
    }

    /// Blocks until the download finishes and returns its terminal state.
    ///
    /// # Errors
    ///
    /// Returns bridge errors; the wait itself cannot fail.
    pub fn wait(&self) -> Result<DownloadEnd> {
        let download = self.inner.clone();
        self.bridge.run(async move { Ok(download.wait().await) })
    }

    /// Blocks until completion and returns the remote temp file path.
    ///
    /// # Errors
    ///
    /// Returns bridge errors; `None` means the download did not produce
    /// a file.
    pub fn path(&self) -> Result<Option<String>> {
        let download = self.inner.clone();
        self.bridge.run(async move { Ok(download.path().await) })
    }

    /// Blocks until completion, then saves the file to `dest_path`.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncDownload::save_as`].
    pub fn save_as(&self, dest_path: &str) -> Result<()> {
        let download = self.inner.clone();
        let dest = dest_path.to_string();
        self.bridge
            .run(async move { download.save_as(&dest).await })
    }
}

// ============================================================================
// Response
// ============================================================================

/// Blocking completed-response handle.
///
/// Received by a response handler; [`body`](Self::body) blocks the
/// calling thread and must be used from outside the handler itself.
#[derive(Clone)]
pub struct Response {
    inner: ResponseInfo,
    bridge: Arc<SyncBridge>,
}

impl Response {
    pub(crate) fn new(inner: ResponseInfo, bridge: Arc<SyncBridge>) -> Self {
        Self { inner, bridge }
    }

    /// The response URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.url()
    }

    /// The HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.inner.status()
    }

    /// The response headers as a map.
    #[must_use]
    pub fn headers(&self) -> std::collections::HashMap<String, String> {
        self.inner.headers()
    }

    /// Blocks while fetching the response body as text.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseInfo::body`], plus bridge errors.
    pub fn body(&self) -> Result<Option<String>> {
        let response = self.inner.clone();
        self.bridge.run(async move { response.body().await })
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.inner.url())
            .field("status", &self.inner.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Blocking clock controller.
///
/// Obtained via [`super::Page::clock`]; every method forwards through
/// the bridge.
#[derive(Clone)]
pub struct Clock {
    inner: AsyncClock,
    bridge: Arc<SyncBridge>,
}

impl Clock {
    pub(crate) fn new(inner: AsyncClock, bridge: Arc<SyncBridge>) -> Self {
        Self { inner, bridge }
    }

    /// Installs the fake clock.
    pub fn install(&self, time: Option<u64>, timezone: Option<&str>) -> Result<()> {
        let clock = self.inner.clone();
        let timezone = timezone.map(str::to_string);
        self.bridge
            .run(async move { clock.install(time, timezone.as_deref()).await })
    }

    /// Jumps forward by `ticks` ms, firing each due timer at most once.
    pub fn fast_forward(&self, ticks: u64) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.fast_forward(ticks).await })
    }

    /// Advances `ticks` ms, firing every callback systematically.
    pub fn run_for(&self, ticks: u64) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.run_for(ticks).await })
    }

    /// Jumps to `time` and pauses the fake clock there.
    pub fn pause_at(&self, time: u64) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.pause_at(time).await })
    }

    /// Resumes real-time progression from the current fake time.
    pub fn resume(&self) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.resume().await })
    }

    /// Freezes `Date.now()` at `time`. Timers keep running.
    pub fn set_fixed_time(&self, time: u64) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.set_fixed_time(time).await })
    }

    /// Sets `Date.now()` to `time` without triggering timers.
    pub fn set_system_time(&self, time: u64) -> Result<()> {
        let clock = self.inner.clone();
        self.bridge.run(async move { clock.set_system_time(time).await })
    }

    /// Overrides the browser timezone.
    pub fn set_timezone(&self, timezone: &str) -> Result<()> {
        let clock = self.inner.clone();
        let timezone = timezone.to_string();
        self.bridge
            .run(async move { clock.set_timezone(&timezone).await })
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_decision_default_is_dismiss() {
        let decision = DialogDecision::Dismiss;
        assert!(matches!(decision, DialogDecision::Dismiss));
    }

    #[test]
    fn test_route_decision_default_is_continue() {
        let decision = RouteDecision::Continue(ContinueOptions::default());
        assert!(matches!(decision, RouteDecision::Continue(_)));
    }
}
