//! Blocking Browser and Page wrappers.
//!
//! Every method forwards through [`SyncBridge::run`]; no protocol
//! logic is duplicated here.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::browser::{
    Browser as AsyncBrowser, ConsoleMessage, LaunchOptions, Page as AsyncPage, WebSocketInfo,
};
use crate::error::Result;

use super::bridge::SyncBridge;
use super::objects::{Clock, Dialog, Download, Response, Route};

// ============================================================================
// Browser
// ============================================================================

/// Blocking browser handle.
///
/// Owns the bridge: `launch` constructs and starts it, `close` stops
/// it. The bridge is an explicit per-browser value; there is no
/// process-wide launcher singleton.
pub struct Browser {
    inner: Arc<AsyncBrowser>,
    bridge: Arc<SyncBridge>,
}

impl Browser {
    /// Launches a browser and connects, blocking until ready.
    ///
    /// # Errors
    ///
    /// Returns bridge startup errors plus everything
    /// [`AsyncBrowser::launch`] can return.
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let bridge = Arc::new(SyncBridge::new());
        bridge.start()?;

        let inner = bridge.run(async move { AsyncBrowser::launch(options).await })?;

        Ok(Self {
            inner: Arc::new(inner),
            bridge,
        })
    }

    /// Connects to an already-running browser endpoint.
    ///
    /// # Errors
    ///
    /// Returns bridge startup and connection errors.
    pub fn connect(url: &str) -> Result<Self> {
        let bridge = Arc::new(SyncBridge::new());
        bridge.start()?;

        let url = url.to_string();
        let inner = bridge.run(async move { AsyncBrowser::connect(&url).await })?;

        Ok(Self {
            inner: Arc::new(inner),
            bridge,
        })
    }

    /// Returns the default page.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncBrowser::page`].
    pub fn page(&self) -> Result<Page> {
        let browser = Arc::clone(&self.inner);
        let page = self.bridge.run(async move { browser.page().await })?;
        Ok(Page::new(page, Arc::clone(&self.bridge)))
    }

    /// Opens a new page (tab).
    ///
    /// # Errors
    ///
    /// Same as [`AsyncBrowser::new_page`].
    pub fn new_page(&self) -> Result<Page> {
        let browser = Arc::clone(&self.inner);
        let page = self.bridge.run(async move { browser.new_page().await })?;
        Ok(Page::new(page, Arc::clone(&self.bridge)))
    }

    /// Returns all open pages.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncBrowser::pages`].
    pub fn pages(&self) -> Result<Vec<Page>> {
        let browser = Arc::clone(&self.inner);
        let pages = self.bridge.run(async move { browser.pages().await })?;
        Ok(pages
            .into_iter()
            .map(|page| Page::new(page, Arc::clone(&self.bridge)))
            .collect())
    }

    /// Closes the browser and stops the bridge.
    ///
    /// # Errors
    ///
    /// Same as [`AsyncBrowser::close`]; the bridge is stopped either
    /// way.
    pub fn close(&self) -> Result<()> {
        let browser = Arc::clone(&self.inner);
        let result = self.bridge.run(async move { browser.close().await });
        self.bridge.stop();
        result
    }
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("bridge_running", &self.bridge.is_running())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Page
// ============================================================================

/// Blocking page handle.
#[derive(Clone)]
pub struct Page {
    inner: AsyncPage,
    bridge: Arc<SyncBridge>,
}

impl Page {
    pub(crate) fn new(inner: AsyncPage, bridge: Arc<SyncBridge>) -> Self {
        Self { inner, bridge }
    }

    /// The browsing context id for this page.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &str {
        self.inner.context()
    }

    /// Navigates to a URL.
    pub fn go(&self, url: &str) -> Result<()> {
        let page = self.inner.clone();
        let url = url.to_string();
        self.bridge.run(async move { page.go(&url).await })
    }

    /// Navigates back in history.
    pub fn back(&self) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.back().await })
    }

    /// Navigates forward in history.
    pub fn forward(&self) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.forward().await })
    }

    /// Reloads the page.
    pub fn reload(&self) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.reload().await })
    }

    /// Returns the current page URL.
    pub fn url(&self) -> Result<String> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.url().await })
    }

    /// Returns the current page title.
    pub fn title(&self) -> Result<String> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.title().await })
    }

    /// Returns the full HTML content of the page.
    pub fn content(&self) -> Result<String> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.content().await })
    }

    /// Evaluates a JS expression and returns its value.
    pub fn eval(&self, expression: &str) -> Result<Value> {
        let page = self.inner.clone();
        let expression = expression.to_string();
        self.bridge
            .run(async move { page.eval(&expression).await })
    }

    /// Waits until the page URL matches a pattern.
    pub fn wait_for_url(&self, pattern: &str, timeout: Option<Duration>) -> Result<()> {
        let page = self.inner.clone();
        let pattern = pattern.to_string();
        self.bridge
            .run(async move { page.wait_for_url(&pattern, timeout).await })
    }

    /// Closes this page.
    pub fn close(&self) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move { page.close().await })
    }

    /// Returns the blocking clock controller for this page.
    #[must_use]
    pub fn clock(&self) -> Clock {
        Clock::new(self.inner.clock(), Arc::clone(&self.bridge))
    }

    // ========================================================================
    // Event wiring
    // ========================================================================

    /// Registers a dialog handler.
    ///
    /// The handler records a decision on the [`Dialog`]; dismiss is the
    /// default. The decision is applied after the handler returns.
    pub fn on_dialog(&self, handler: impl Fn(&Dialog) + Send + Sync + 'static) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move {
            page.on_dialog(move |dialog| {
                let wrapper = Dialog::new(dialog);
                handler(&wrapper);
                wrapper.apply();
            })
            .await
        })
    }

    /// Registers a download handler.
    ///
    /// The handler receives a [`Download`] whose waiting methods must
    /// only be used from outside the handler.
    pub fn on_download(
        &self,
        handler: impl Fn(Download) + Send + Sync + 'static,
    ) -> Result<()> {
        let page = self.inner.clone();
        let bridge = Arc::clone(&self.bridge);
        self.bridge.run(async move {
            page.on_download(move |download| {
                handler(Download::new(download, Arc::clone(&bridge)));
            })
            .await
        })
    }

    /// Enables network interception with a route handler.
    ///
    /// The handler records a decision on the [`Route`]; continuing
    /// unchanged is the default.
    pub fn route(&self, handler: impl Fn(&Route) + Send + Sync + 'static) -> Result<()> {
        let page = self.inner.clone();
        self.bridge.run(async move {
            page.route(move |route| {
                let wrapper = Route::new(route);
                handler(&wrapper);
                wrapper.apply();
            })
            .await
        })
    }

    /// Registers a console message handler.
    ///
    /// [`ConsoleMessage`] accessors are already synchronous, so the
    /// handle is passed through unchanged.
    pub fn on_console(
        &self,
        handler: impl Fn(ConsoleMessage) + Send + Sync + 'static,
    ) -> Result<()> {
        let page = self.inner.clone();
        self.bridge
            .run(async move { page.on_console(handler).await })
    }

    /// Registers a handler for completed responses.
    ///
    /// The handler receives a [`Response`] whose `body` method must
    /// only be used from outside the handler.
    pub fn on_response(
        &self,
        handler: impl Fn(Response) + Send + Sync + 'static,
    ) -> Result<()> {
        let page = self.inner.clone();
        let bridge = Arc::clone(&self.bridge);
        self.bridge.run(async move {
            page.on_response(move |response| {
                handler(Response::new(response, Arc::clone(&bridge)));
            })
            .await
        })
    }

    /// Starts observing WebSockets opened by this page.
    ///
    /// [`WebSocketInfo`] registration methods are already synchronous,
    /// so the async handle is passed through unchanged.
    pub fn on_websocket(
        &self,
        handler: impl Fn(WebSocketInfo) + Send + Sync + 'static,
    ) -> Result<()> {
        let page = self.inner.clone();
        self.bridge
            .run(async move { page.on_websocket(handler).await })
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("context", &self.inner.context())
            .finish_non_exhaustive()
    }
}
