//! Command/response correlation table.
//!
//! Maps in-flight command ids to pending completion slots. Each slot
//! resolves exactly once: with the matching response, or with a local
//! failure on connection loss. The table knows nothing about method
//! semantics.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::ResponseEnvelope;

// ============================================================================
// Types
// ============================================================================

/// One pending completion slot.
type Slot = oneshot::Sender<Result<ResponseEnvelope>>;

// ============================================================================
// CorrelationTable
// ============================================================================

/// Id-keyed map of pending command slots.
///
/// Owned by the connection; the receive loop resolves slots, `send()`
/// registers them, the timeout path removes them.
#[derive(Default)]
pub struct CorrelationTable {
    slots: Mutex<FxHashMap<CommandId, Slot>>,
}

impl CorrelationTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending slot for `id` and returns its receiver.
    ///
    /// The caller awaits the receiver; the slot is consumed by exactly
    /// one of [`resolve`](Self::resolve), [`fail`](Self::fail) or
    /// [`fail_all`](Self::fail_all).
    pub fn register(&self, id: CommandId) -> oneshot::Receiver<Result<ResponseEnvelope>> {
        let (tx, rx) = oneshot::channel();
        let previous = self.slots.lock().insert(id, tx);
        debug_assert!(previous.is_none(), "command id reused while in flight");
        rx
    }

    /// Resolves the slot for `response.id` with the response.
    ///
    /// Returns `false` if no slot was registered (late response after a
    /// timeout removal, or an id this client never issued).
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let slot = self.slots.lock().remove(&response.id);
        match slot {
            Some(tx) => tx.send(Ok(response)).is_ok(),
            None => false,
        }
    }

    /// Fails the slot for `id` with `error`.
    ///
    /// No-op if the slot was already removed.
    pub fn fail(&self, id: CommandId, error: Error) -> bool {
        let slot = self.slots.lock().remove(&id);
        match slot {
            Some(tx) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Removes the slot for `id` without resolving it.
    ///
    /// Used by the `send()` timeout path so a late response is discarded
    /// instead of resolving an already-failed call.
    pub fn remove(&self, id: CommandId) {
        if self.slots.lock().remove(&id).is_some() {
            debug!(%id, "Removed timed-out correlation slot");
        }
    }

    /// Fails every pending slot with [`Error::ConnectionClosed`].
    ///
    /// Called once when the receive loop exits.
    pub fn fail_all(&self) {
        let pending: Vec<(CommandId, Slot)> = self.slots.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on connection loss");
        }
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no commands are in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: u64) -> ResponseEnvelope {
        serde_json::from_str(&format!(r#"{{"id":{id},"result":{{"ok":true}}}}"#)).expect("parse")
    }

    #[tokio::test]
    async fn test_register_resolve() {
        let table = CorrelationTable::new();
        let id = CommandId::from_raw(1);

        let rx = table.register(id);
        assert_eq!(table.len(), 1);

        assert!(table.resolve(response(1)));
        assert!(table.is_empty());

        let result = rx.await.expect("slot resolved").expect("success");
        assert_eq!(result.id, id);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_noop() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(response(99)));
    }

    #[tokio::test]
    async fn test_resolve_after_remove_is_discarded() {
        let table = CorrelationTable::new();
        let id = CommandId::from_raw(2);

        let _rx = table.register(id);
        table.remove(id);

        // Late response after the timeout path ran.
        assert!(!table.resolve(response(2)));
    }

    #[tokio::test]
    async fn test_fail_delivers_error() {
        let table = CorrelationTable::new();
        let id = CommandId::from_raw(3);

        let rx = table.register(id);
        assert!(table.fail(id, Error::ConnectionClosed));

        let result = rx.await.expect("slot resolved");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = CorrelationTable::new();
        let receivers: Vec<_> = (10..13)
            .map(|n| table.register(CommandId::from_raw(n)))
            .collect();

        table.fail_all();
        assert!(table.is_empty());

        for rx in receivers {
            let result = rx.await.expect("slot resolved");
            assert!(matches!(result, Err(Error::ConnectionClosed)));
        }
    }

    #[tokio::test]
    async fn test_correlation_is_id_keyed_not_order_keyed() {
        let table = CorrelationTable::new();
        let rx_a = table.register(CommandId::from_raw(20));
        let rx_b = table.register(CommandId::from_raw(21));

        // Responses arrive in reverse order.
        assert!(table.resolve(response(21)));
        assert!(table.resolve(response(20)));

        let a = rx_a.await.expect("resolved").expect("success");
        let b = rx_b.await.expect("resolved").expect("success");
        assert_eq!(a.id, CommandId::from_raw(20));
        assert_eq!(b.id, CommandId::from_raw(21));
    }
}
