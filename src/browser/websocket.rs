//! Page WebSocket observation.
//!
//! A [`WebSocketInfo`] tracks one WebSocket connection opened by the
//! page, fed by the `vibium:ws.*` vendor events. Message and close
//! handlers are invoked in registration order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

// ============================================================================
// Types
// ============================================================================

/// Direction of an observed WebSocket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the page.
    Sent,
    /// Received by the page.
    Received,
}

impl Direction {
    /// Parses the wire `direction` string; anything unknown is treated
    /// as received.
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        if s == "sent" { Self::Sent } else { Self::Received }
    }
}

/// Handler for observed messages: `(data, direction)`.
pub type MessageHandler = Box<dyn Fn(&str, Direction) + Send + Sync>;

/// Handler for the close event: `(code, reason)`.
pub type CloseHandler = Box<dyn Fn(Option<u16>, Option<&str>) + Send + Sync>;

/// Handle returned by [`WebSocketInfo::on_message`] and
/// [`WebSocketInfo::on_close`]; pass it back to the matching
/// `remove_*_handler` to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

// ============================================================================
// WebSocketInfo
// ============================================================================

struct WebSocketInfoInner {
    url: String,
    closed: AtomicBool,
    next_callback_id: AtomicU64,
    message_handlers: Mutex<Vec<(CallbackId, MessageHandler)>>,
    close_handlers: Mutex<Vec<(CallbackId, CloseHandler)>>,
}

impl WebSocketInfoInner {
    fn next_id(&self) -> CallbackId {
        CallbackId(self.next_callback_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// A WebSocket connection opened by the page.
#[derive(Clone)]
pub struct WebSocketInfo {
    inner: Arc<WebSocketInfoInner>,
}

impl WebSocketInfo {
    /// Creates a handle from a `vibium:ws.created` event.
    pub(crate) fn new(url: String) -> Self {
        Self {
            inner: Arc::new(WebSocketInfoInner {
                url,
                closed: AtomicBool::new(false),
                next_callback_id: AtomicU64::new(0),
                message_handlers: Mutex::new(Vec::new()),
                close_handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns `true` once the connection has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Registers a handler for observed messages (both directions).
    pub fn on_message(
        &self,
        handler: impl Fn(&str, Direction) + Send + Sync + 'static,
    ) -> CallbackId {
        let id = self.inner.next_id();
        self.inner.message_handlers.lock().push((id, Box::new(handler)));
        id
    }

    /// Unregisters a message handler. Returns `false` if the id was
    /// already removed.
    pub fn remove_message_handler(&self, id: CallbackId) -> bool {
        let mut handlers = self.inner.message_handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() < before
    }

    /// Registers a handler for the close event.
    pub fn on_close(
        &self,
        handler: impl Fn(Option<u16>, Option<&str>) + Send + Sync + 'static,
    ) -> CallbackId {
        let id = self.inner.next_id();
        self.inner.close_handlers.lock().push((id, Box::new(handler)));
        id
    }

    /// Unregisters a close handler. Returns `false` if the id was
    /// already removed.
    pub fn remove_close_handler(&self, id: CallbackId) -> bool {
        let mut handlers = self.inner.close_handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() < before
    }

    /// Feeds one observed message to the registered handlers.
    ///
    /// Called by the page's `vibium:ws.message` subscription.
    pub(crate) fn emit_message(&self, data: &str, direction: Direction) {
        for (_, handler) in self.inner.message_handlers.lock().iter() {
            handler(data, direction);
        }
    }

    /// Marks the connection closed and notifies close handlers.
    ///
    /// Called by the page's `vibium:ws.closed` subscription.
    pub(crate) fn emit_close(&self, code: Option<u16>, reason: Option<&str>) {
        self.inner.closed.store(true, Ordering::Release);
        for (_, handler) in self.inner.close_handlers.lock().iter() {
            handler(code, reason);
        }
    }
}

impl std::fmt::Debug for WebSocketInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketInfo")
            .field("url", &self.inner.url)
            .field("closed", &self.is_closed())
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
    fn test_direction_from_wire() {
        assert_eq!(Direction::from_wire("sent"), Direction::Sent);
        assert_eq!(Direction::from_wire("received"), Direction::Received);
        assert_eq!(Direction::from_wire("garbage"), Direction::Received);
    }

    #[test]
    fn test_message_handlers_run_in_registration_order() {
        let ws = WebSocketInfo::new("wss://example.com/feed".to_string());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b"] {
            let seen = Arc::clone(&seen);
            ws.on_message(move |data, direction| {
                seen.lock().push((label, data.to_string(), direction));
            });
        }

        ws.emit_message("hello", Direction::Sent);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("a", "hello".to_string(), Direction::Sent));
        assert_eq!(seen[1], ("b", "hello".to_string(), Direction::Sent));
    }

    #[test]
    fn test_removed_message_handler_stops_receiving() {
        let ws = WebSocketInfo::new("wss://example.com/feed".to_string());
        let count = Arc::new(Mutex::new(0u32));

        let id = {
            let count = Arc::clone(&count);
            ws.on_message(move |_, _| *count.lock() += 1)
        };

        ws.emit_message("one", Direction::Received);
        assert!(ws.remove_message_handler(id));
        ws.emit_message("two", Direction::Received);

        assert_eq!(*count.lock(), 1);
        // Removing again is a no-op.
        assert!(!ws.remove_message_handler(id));
    }

    #[test]
    fn test_removed_close_handler_stops_receiving() {
        let ws = WebSocketInfo::new("wss://example.com/feed".to_string());
        let fired = Arc::new(Mutex::new(false));

        let id = {
            let fired = Arc::clone(&fired);
            ws.on_close(move |_, _| *fired.lock() = true)
        };

        assert!(ws.remove_close_handler(id));
        ws.emit_close(Some(1001), None);

        assert!(!*fired.lock());
        assert!(ws.is_closed());
    }

    #[test]
    fn test_close_marks_and_notifies() {
        let ws = WebSocketInfo::new("wss://example.com/feed".to_string());
        let seen = Arc::new(Mutex::new(None));

        {
            let seen = Arc::clone(&seen);
            ws.on_close(move |code, reason| {
                *seen.lock() = Some((code, reason.map(str::to_string)));
            });
        }

        assert!(!ws.is_closed());
        ws.emit_close(Some(1000), Some("done"));

        assert!(ws.is_closed());
        assert_eq!(
            *seen.lock(),
            Some((Some(1000), Some("done".to_string())))
        );
    }
}
