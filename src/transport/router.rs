//! Event routing fabric.
//!
//! Maps an event's method name (and optional browsing-context filter) to
//! registered subscribers. The receive loop calls [`EventRouter::dispatch`]
//! for every event frame; handlers run synchronously in subscription
//! order and must not block the loop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::SubscriptionId;
use crate::protocol::EventEnvelope;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Invoked with the event's `params` for every matching event. Handlers
/// run on the receive loop and must return promptly; long work should be
/// handed to a task or channel.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// One registered subscription.
struct Subscription {
    id: SubscriptionId,
    method: String,
    /// When set, only events whose `params.context` equals this value match.
    context: Option<String>,
    handler: EventHandler,
}

// ============================================================================
// EventRouter
// ============================================================================

/// Registry of event subscriptions.
///
/// Matching rule: exact method-name equality, plus context equality when
/// the subscription carries a context filter. Handlers for one event are
/// invoked in subscription order.
#[derive(Default)]
pub struct EventRouter {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventRouter {
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `method`, optionally filtered to one
    /// browsing context.
    ///
    /// Returns a handle for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        method: impl Into<String>,
        context: Option<String>,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId::next();
        let method = method.into();

        trace!(%id, method = %method, context = ?context, "Subscription registered");

        self.subscriptions.lock().push(Subscription {
            id,
            method,
            context,
            handler,
        });
        id
    }

    /// Removes a subscription.
    ///
    /// Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Delivers an event to every matching subscription.
    ///
    /// Returns the number of handlers invoked. An event matching no
    /// subscription is not an error; it is simply dropped.
    pub fn dispatch(&self, event: &EventEnvelope) -> usize {
        // Snapshot matching handlers so a handler may subscribe or
        // unsubscribe without deadlocking on the registry lock.
        let handlers: Vec<EventHandler> = {
            let subs = self.subscriptions.lock();
            subs.iter()
                .filter(|s| Self::matches(s, event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in &handlers {
            handler(&event.params);
        }

        trace!(
            method = %event.method,
            delivered = handlers.len(),
            "Event dispatched"
        );

        handlers.len()
    }

    /// Returns the number of active subscriptions.
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn matches(subscription: &Subscription, event: &EventEnvelope) -> bool {
        if subscription.method != event.method {
            return false;
        }
        match &subscription.context {
            Some(wanted) => event.context() == Some(wanted.as_str()),
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
