//! Page handle: navigation and event wiring.
//!
//! A [`Page`] is a thin caller of [`Client::send`] scoped to one
//! browsing context. It also owns the event wiring that backs the
//! stateful objects: dialogs, downloads, routes, and observed page
//! WebSockets.
//!
//! Event handlers run on the connection's receive loop and must return
//! promptly; hand long work to a task or channel.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::SubscriptionId;
use crate::transport::Client;

use super::clock::Clock;
use super::console::ConsoleMessage;
use super::dialog::Dialog;
use super::download::Download;
use super::route::{RequestInfo, ResponseInfo, Route};
use super::websocket::{Direction, WebSocketInfo};

// ============================================================================
// Event method names
// ============================================================================

const EVENT_USER_PROMPT_OPENED: &str = "browsingContext.userPromptOpened";
const EVENT_DOWNLOAD_WILL_BEGIN: &str = "browsingContext.downloadWillBegin";
const EVENT_DOWNLOAD_END: &str = "browsingContext.downloadEnd";
const EVENT_BEFORE_REQUEST_SENT: &str = "network.beforeRequestSent";
const EVENT_RESPONSE_COMPLETED: &str = "network.responseCompleted";
const EVENT_LOG_ENTRY_ADDED: &str = "log.entryAdded";
const EVENT_WS_CREATED: &str = "vibium:ws.created";
const EVENT_WS_MESSAGE: &str = "vibium:ws.message";
const EVENT_WS_CLOSED: &str = "vibium:ws.closed";

// ============================================================================
// Page
// ============================================================================

struct PageInner {
    client: Client,
    context: String,
    /// Downloads that started but have not seen their downloadEnd yet,
    /// in start order.
    pending_downloads: Mutex<Vec<Download>>,
    /// Observed page WebSockets keyed by the monitor's connection id.
    websockets: Mutex<FxHashMap<u64, WebSocketInfo>>,
    /// Router subscriptions owned by this page's event wiring; torn
    /// down on `close()`.
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// A handle to one page (browsing context).
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    /// Creates a page handle for an existing browsing context.
    pub(crate) fn new(client: Client, context: String) -> Self {
        Self {
            inner: Arc::new(PageInner {
                client,
                context,
                pending_downloads: Mutex::new(Vec::new()),
                websockets: Mutex::new(FxHashMap::default()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The browsing context id for this page.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &str {
        &self.inner.context
    }

    fn client(&self) -> &Client {
        &self.inner.client
    }

    fn context_params(&self) -> Value {
        json!({ "context": self.inner.context })
    }

    /// Records a router subscription for teardown on [`close`](Self::close).
    fn track(&self, id: SubscriptionId) {
        self.inner.subscriptions.lock().push(id);
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigates to a URL.
    pub async fn go(&self, url: &str) -> Result<()> {
        debug!(url = %url, context = %self.inner.context, "Navigating");
        self.client()
            .send(
                "vibium:page.navigate",
                json!({ "context": self.inner.context, "url": url }),
            )
            .await?;
        Ok(())
    }

    /// Navigates back in history.
    pub async fn back(&self) -> Result<()> {
        self.client()
            .send("vibium:page.back", self.context_params())
            .await?;
        Ok(())
    }

    /// Navigates forward in history.
    pub async fn forward(&self) -> Result<()> {
        self.client()
            .send("vibium:page.forward", self.context_params())
            .await?;
        Ok(())
    }

    /// Reloads the page.
    pub async fn reload(&self) -> Result<()> {
        self.client()
            .send("vibium:page.reload", self.context_params())
            .await?;
        Ok(())
    }

    /// Returns the current page URL.
    pub async fn url(&self) -> Result<String> {
        let result = self
            .client()
            .send("vibium:page.url", self.context_params())
            .await?;
        Ok(string_field(&result, "url"))
    }

    /// Returns the current page title.
    pub async fn title(&self) -> Result<String> {
        let result = self
            .client()
            .send("vibium:page.title", self.context_params())
            .await?;
        Ok(string_field(&result, "title"))
    }

    /// Returns the full HTML content of the page.
    pub async fn content(&self) -> Result<String> {
        let result = self
            .client()
            .send("vibium:page.content", self.context_params())
            .await?;
        Ok(string_field(&result, "content"))
    }

    /// Evaluates a JS expression and returns its deserialized value.
    pub async fn eval(&self, expression: &str) -> Result<Value> {
        let result = self
            .client()
            .send(
                "vibium:page.eval",
                json!({ "context": self.inner.context, "expression": expression }),
            )
            .await?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Waits until the page URL matches a pattern.
    pub async fn wait_for_url(&self, pattern: &str, timeout: Option<Duration>) -> Result<()> {
        let mut params = json!({ "context": self.inner.context, "pattern": pattern });
        if let Some(timeout) = timeout {
            params["timeout"] = json!(timeout.as_millis() as u64);
        }
        self.client().send("vibium:page.waitForURL", params).await?;
        Ok(())
    }

    /// Closes this page and tears down its event wiring.
    pub async fn close(&self) -> Result<()> {
        let result = self
            .client()
            .send("vibium:page.close", self.context_params())
            .await;

        // The context is gone either way; stop routing its events.
        self.teardown_wiring();

        result.map(|_| ())
    }

    /// Unregisters every router subscription owned by this page and
    /// drops per-context event state.
    fn teardown_wiring(&self) {
        for id in self.inner.subscriptions.lock().drain(..) {
            self.client().unsubscribe(id);
        }
        self.inner.websockets.lock().clear();
        self.inner.pending_downloads.lock().clear();
    }

    /// Returns the clock controller for this page.
    #[must_use]
    pub fn clock(&self) -> Clock {
        Clock::new(self.client().clone(), self.inner.context.clone())
    }

    // ========================================================================
    // Event wiring
    // ========================================================================

    /// Registers a dialog handler for this page.
    ///
    /// The handler receives a [`Dialog`] for every opened user prompt
    /// and decides it by calling `accept` or `dismiss`.
    pub async fn on_dialog(
        &self,
        handler: impl Fn(Dialog) + Send + Sync + 'static,
    ) -> Result<()> {
        let client = self.client().clone();
        let context = self.inner.context.clone();

        // Local registration first so no event can slip between the
        // remote subscribe and our readiness to receive it.
        let id = self.client().subscribe(
            EVENT_USER_PROMPT_OPENED,
            Some(context.clone()),
            Arc::new(move |params| {
                let dialog = Dialog::new(client.clone(), context.clone(), params.clone());
                handler(dialog);
            }),
        );
        self.track(id);

        self.subscribe_remote(&[EVENT_USER_PROMPT_OPENED]).await
    }

    /// Registers a download handler for this page.
    ///
    /// The handler receives a [`Download`] when a download starts; its
    /// terminal state resolves once the matching end event arrives.
    pub async fn on_download(
        &self,
        handler: impl Fn(Download) + Send + Sync + 'static,
    ) -> Result<()> {
        let begin_inner = Arc::clone(&self.inner);
        let begin_id = self.client().subscribe(
            EVENT_DOWNLOAD_WILL_BEGIN,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                let download = Download::new(
                    begin_inner.client.clone(),
                    string_field(params, "url"),
                    string_field(params, "suggestedFilename"),
                );
                begin_inner
                    .pending_downloads
                    .lock()
                    .push(download.clone());
                handler(download);
            }),
        );
        self.track(begin_id);

        let end_inner = Arc::clone(&self.inner);
        let end_id = self.client().subscribe(
            EVENT_DOWNLOAD_END,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                // Downloads finish in start order per context; resolve
                // the oldest one still pending.
                let pending = {
                    let mut downloads = end_inner.pending_downloads.lock();
                    if downloads.is_empty() {
                        None
                    } else {
                        Some(downloads.remove(0))
                    }
                };

                match pending {
                    Some(download) => {
                        let status = match params.get("status").and_then(Value::as_str) {
                            Some(status) => status.to_string(),
                            None => "unknown".to_string(),
                        };
                        let filepath = params
                            .get("filepath")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        download.complete(status, filepath);
                    }
                    None => warn!("downloadEnd with no pending download"),
                }
            }),
        );
        self.track(end_id);

        self.subscribe_remote(&[EVENT_DOWNLOAD_WILL_BEGIN, EVENT_DOWNLOAD_END])
            .await
    }

    /// Registers a console message handler for this page.
    ///
    /// The handler receives a [`ConsoleMessage`] for every console call
    /// the page makes (`console.log`, `warn`, `error`, ...).
    pub async fn on_console(
        &self,
        handler: impl Fn(ConsoleMessage) + Send + Sync + 'static,
    ) -> Result<()> {
        let context = self.inner.context.clone();

        // Log entries scope their context under `source`, so the filter
        // lives in the handler instead of the router.
        let id = self.client().subscribe(
            EVENT_LOG_ENTRY_ADDED,
            None,
            Arc::new(move |params| {
                let entry_context = params
                    .get("source")
                    .and_then(|s| s.get("context"))
                    .and_then(Value::as_str)
                    .or_else(|| params.get("context").and_then(Value::as_str));
                if entry_context != Some(context.as_str()) {
                    return;
                }
                handler(ConsoleMessage::new(params.clone()));
            }),
        );
        self.track(id);

        self.subscribe_remote(&[EVENT_LOG_ENTRY_ADDED]).await
    }

    /// Registers a handler for completed responses on this page.
    ///
    /// The handler receives a [`ResponseInfo`]; its body is fetched on
    /// demand and must only be awaited from outside the handler.
    pub async fn on_response(
        &self,
        handler: impl Fn(ResponseInfo) + Send + Sync + 'static,
    ) -> Result<()> {
        let client = self.client().clone();
        let id = self.client().subscribe(
            EVENT_RESPONSE_COMPLETED,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                handler(ResponseInfo::with_client(params.clone(), client.clone()));
            }),
        );
        self.track(id);

        self.subscribe_remote(&[EVENT_RESPONSE_COMPLETED]).await
    }

    /// Enables network interception and registers a route handler.
    ///
    /// The local subscription is registered before the intercept is
    /// enabled remotely, so the first intercepted request cannot be
    /// missed.
    pub async fn route(&self, handler: impl Fn(Route) + Send + Sync + 'static) -> Result<()> {
        let client = self.client().clone();
        let id = self.client().subscribe(
            EVENT_BEFORE_REQUEST_SENT,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                let request = RequestInfo::with_client(params.clone(), client.clone());
                let request_id = request.request_id().to_string();
                handler(Route::new(client.clone(), request_id, request));
            }),
        );
        self.track(id);

        self.subscribe_remote(&[EVENT_BEFORE_REQUEST_SENT]).await?;

        self.client()
            .send(
                "network.addIntercept",
                json!({
                    "phases": ["beforeRequestSent"],
                    "contexts": [self.inner.context],
                }),
            )
            .await?;
        Ok(())
    }

    /// Starts observing WebSockets opened by this page.
    ///
    /// The handler receives a [`WebSocketInfo`] for every connection the
    /// page opens; messages and the close event feed its registered
    /// callbacks.
    pub async fn on_websocket(
        &self,
        handler: impl Fn(WebSocketInfo) + Send + Sync + 'static,
    ) -> Result<()> {
        let created_inner = Arc::clone(&self.inner);
        let created_id = self.client().subscribe(
            EVENT_WS_CREATED,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                let Some(id) = params.get("id").and_then(Value::as_u64) else {
                    warn!("ws.created without connection id");
                    return;
                };
                let ws = WebSocketInfo::new(string_field(params, "url"));
                created_inner.websockets.lock().insert(id, ws.clone());
                handler(ws);
            }),
        );
        self.track(created_id);

        let message_inner = Arc::clone(&self.inner);
        let message_id = self.client().subscribe(
            EVENT_WS_MESSAGE,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                let Some(ws) = lookup_websocket(&message_inner, params) else {
                    return;
                };
                let data = string_field(params, "data");
                let direction = params
                    .get("direction")
                    .and_then(Value::as_str)
                    .map_or(Direction::Received, Direction::from_wire);
                ws.emit_message(&data, direction);
            }),
        );
        self.track(message_id);

        let closed_inner = Arc::clone(&self.inner);
        let closed_id = self.client().subscribe(
            EVENT_WS_CLOSED,
            Some(self.inner.context.clone()),
            Arc::new(move |params| {
                let Some(ws) = lookup_websocket(&closed_inner, params) else {
                    return;
                };
                let code = params
                    .get("code")
                    .and_then(Value::as_u64)
                    .map(|c| c as u16);
                let reason = params.get("reason").and_then(Value::as_str);
                ws.emit_close(code, reason);

                // A closed connection gets no further events; drop it
                // from the map.
                if let Some(id) = params.get("id").and_then(Value::as_u64) {
                    closed_inner.websockets.lock().remove(&id);
                }
            }),
        );
        self.track(closed_id);

        // Installs the monitor preload script on the remote end.
        self.client()
            .send("vibium:page.onWebSocket", self.context_params())
            .await?;
        Ok(())
    }

    /// Subscribes to baseline protocol events on the remote end.
    async fn subscribe_remote(&self, events: &[&str]) -> Result<()> {
        self.client()
            .send(
                "session.subscribe",
                json!({ "events": events, "contexts": [self.inner.context] }),
            )
            .await?;
        Ok(())
    }
}

fn lookup_websocket(inner: &PageInner, params: &Value) -> Option<WebSocketInfo> {
    let id = params.get("id").and_then(Value::as_u64)?;
    inner.websockets.lock().get(&id).cloned()
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("context", &self.inner.context)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_field() {
        let value = json!({ "url": "https://example.com", "n": 3 });
        assert_eq!(string_field(&value, "url"), "https://example.com");
        assert_eq!(string_field(&value, "n"), "");
        assert_eq!(string_field(&value, "missing"), "");
    }

    #[test]
    fn test_event_method_names() {
        // Baseline protocol events carry no vendor prefix; the WS
        // monitor events do.
        assert!(!EVENT_USER_PROMPT_OPENED.starts_with("vibium:"));
        assert!(!EVENT_BEFORE_REQUEST_SENT.starts_with("vibium:"));
        assert!(EVENT_WS_CREATED.starts_with("vibium:"));
        assert!(EVENT_WS_MESSAGE.starts_with("vibium:"));
        assert!(EVENT_WS_CLOSED.starts_with("vibium:"));
    }
}
