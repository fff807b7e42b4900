//! Event message types.
//!
//! Events are unsolicited notifications sent by the remote end over the
//! WebSocket transport. They carry a method name and no correlation id.
//!
//! # Format
//!
//! ```json
//! { "method": "browsingContext.load", "params": { ... } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event
// ============================================================================

/// An event notification from remote end to local end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns the module name from the method.
    ///
    /// # Example
    ///
    /// ```
    /// # use driver_wire::Event;
    /// let event = Event::new("browsingContext.load", serde_json::Value::Null);
    /// assert_eq!(event.module(), "browsingContext");
    /// ```
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    ///
    /// # Example
    ///
    /// ```
    /// # use driver_wire::Event;
    /// let event = Event::new("browsingContext.load", serde_json::Value::Null);
    /// assert_eq!(event.event_name(), "load");
    /// ```
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Gets a string value from the params.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

// ============================================================================
// EventHandler
// ============================================================================

/// Event callback.
///
/// Runs on the transport's reader task. It must not block, and it must not
/// await a command reply synchronously; doing so starves the correlator.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

// ============================================================================
// Tests
// ============================================================================
