//! Command model.
//!
//! A [`Command`] is an immutable description of one request: a name, an
//! ordered parameter bag and a target context. It is built by the calling
//! layer and consumed exactly once by the dispatcher, which hands it to the
//! active transport for encoding.
//!
//! # Example
//!
//! ```
//! use driver_wire::Command;
//! use serde_json::json;
//!
//! let command = Command::new("findElement")
//!     .with_session("4f1c")
//!     .with_param("using", json!("css selector"))
//!     .with_param("value", json!("#submit"));
//!
//! assert_eq!(command.name(), "findElement");
//! assert_eq!(command.parameters().len(), 2);
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identifiers::{BrowsingContextId, ElementId, SessionId};

// ============================================================================
// Well-known Names
// ============================================================================

/// Command names with protocol-level meaning.
///
/// Everything else is opaque to the engine.
pub mod names {
    /// Handshake that creates a session (HTTP, socket).
    pub const NEW_SESSION: &str = "newSession";
    /// Handshake that creates a session (WebSocket/BiDi).
    pub const SESSION_NEW: &str = "session.new";
    /// Session teardown (HTTP).
    pub const DELETE_SESSION: &str = "deleteSession";
    /// Session teardown (legacy socket).
    pub const QUIT: &str = "quit";
    /// Session teardown (WebSocket/BiDi).
    pub const SESSION_END: &str = "session.end";
}

// ============================================================================
// CommandContext
// ============================================================================

/// Target of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandContext {
    /// Session the command belongs to. Required except for the handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Element the command acts on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,

    /// Window, tab or frame the command targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browsing_context_id: Option<BrowsingContextId>,
}

// ============================================================================
// Command
// ============================================================================

/// One request to the remote automation endpoint.
///
/// Built with the `with_*` methods; there are no setters once the value is
/// handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    parameters: Map<String, Value>,
    context: CommandContext,
}

impl Command {
    /// Creates a command with no parameters and an empty context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
            context: CommandContext::default(),
        }
    }

    /// Adds (or replaces) one parameter, keeping insertion order.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Replaces the whole parameter bag.
    ///
    /// Non-object values are ignored.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.parameters = map;
        }
        self
    }

    /// Sets the session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.context.session_id = Some(session_id.into());
        self
    }

    /// Sets the target element.
    #[must_use]
    pub fn with_element(mut self, element_id: impl Into<ElementId>) -> Self {
        self.context.element_id = Some(element_id.into());
        self
    }

    /// Sets the target browsing context.
    #[must_use]
    pub fn with_browsing_context(mut self, context_id: impl Into<BrowsingContextId>) -> Self {
        self.context.browsing_context_id = Some(context_id.into());
        self
    }
}

// ============================================================================
// Command - Accessors
// ============================================================================

impl Command {
    /// Returns the command name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered parameter bag.
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Returns one parameter.
    #[inline]
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Returns the target context.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    /// Returns the session, if set.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.context.session_id.as_ref()
    }

    /// Returns `true` for the command that creates a session.
    #[inline]
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        matches!(self.name.as_str(), names::NEW_SESSION | names::SESSION_NEW)
    }

    /// Returns `true` for the command that ends a session.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.name.as_str(),
            names::DELETE_SESSION | names::QUIT | names::SESSION_END
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
