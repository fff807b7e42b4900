//! Event subscriber registry.
//!
//! Handlers are keyed by event method (`"browsingContext.load"`), or by `"*"`
//! to receive every event. Dispatch clones the matching handlers out of the
//! lock before invoking them, so a handler may subscribe or unsubscribe
//! without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::SubscriptionId;
use crate::protocol::{Event, EventHandler};

// ============================================================================
// Constants
// ============================================================================

/// Subscription key matching every event.
pub const WILDCARD: &str = "*";

// ============================================================================
// Subscriptions
// ============================================================================

/// Registry of event callbacks.
#[derive(Default)]
pub struct Subscriptions {
    next_id: AtomicU64,
    handlers: Mutex<FxHashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("count", &self.len())
            .finish()
    }
}

impl Subscriptions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`.
    pub fn add(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        trace!(%id, event, "Subscribed");
        id
    }

    /// Removes a handler; returns whether it was registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Invokes every handler registered for the event, in registration order
    /// per key, followed by wildcard handlers. Returns how many ran.
    pub fn dispatch(&self, event: &Event) -> usize {
        let matched: Vec<EventHandler> = {
            let handlers = self.handlers.lock();
            [event.method.as_str(), WILDCARD]
                .iter()
                .filter_map(|key| handlers.get(*key))
                .flatten()
                .map(|(_, handler)| EventHandler::clone(handler))
                .collect()
        };

        for handler in &matched {
            handler(event);
        }

        trace!(method = %event.method, handlers = matched.len(), "Event dispatched");
        matched.len()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
