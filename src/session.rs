//! Session context.
//!
//! Per-connection mutable state owned by the dispatcher: the active session,
//! the current browsing-context handle threaded back by the peer, and the
//! failure that poisoned the connection, if any.

// ============================================================================
// Imports
// ============================================================================

use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::{Error, ErrorEnvelope, ErrorKind, Result};
use crate::identifiers::SessionId;
use crate::protocol::Command;

// ============================================================================
// Constants
// ============================================================================

/// Context handle used before the peer names one.
pub const NULL_CONTEXT: &str = "null";

// ============================================================================
// Session
// ============================================================================

/// Server-side state of one active automation connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    current_context: String,
    created_at: SystemTime,
}

impl Session {
    /// Creates a session with the `"null"` context.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            current_context: NULL_CONTEXT.to_string(),
            created_at: SystemTime::now(),
        }
    }

    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the current context handle.
    #[inline]
    #[must_use]
    pub fn current_context(&self) -> &str {
        &self.current_context
    }

    /// Returns when the handshake completed.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

// ============================================================================
// SessionContext
// ============================================================================

/// Mutable per-connection state.
#[derive(Debug, Default)]
pub struct SessionContext {
    session: Option<Session>,
    fatal: Option<ErrorEnvelope>,
}

impl SessionContext {
    /// Creates an empty context.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the current context handle, `"null"` without a session.
    #[inline]
    #[must_use]
    pub fn current_context(&self) -> &str {
        self.session
            .as_ref()
            .map_or(NULL_CONTEXT, Session::current_context)
    }

    /// Returns the failure that closed the connection, if any.
    #[inline]
    #[must_use]
    pub fn fatal(&self) -> Option<&ErrorEnvelope> {
        self.fatal.as_ref()
    }

    /// Checks that a command may be issued.
    ///
    /// The handshake is always allowed through to the transport. Anything
    /// else needs a session id matching the active session, and is refused
    /// with the original failure once the connection is known dead.
    ///
    /// # Errors
    ///
    /// - the stored fatal envelope, converted, after a transport failure
    /// - [`Error::InvalidSession`] when the session id is missing or stale
    pub fn validate(&self, command: &Command) -> Result<()> {
        if command.is_handshake() {
            return Ok(());
        }

        if let Some(fatal) = &self.fatal {
            return Err(Error::Remote(fatal.clone()));
        }

        let Some(requested) = command.session_id() else {
            return Err(Error::invalid_session(format!(
                "command {} has no session id",
                command.name()
            )));
        };

        match &self.session {
            Some(active) if active.id() == requested => Ok(()),
            Some(active) => Err(Error::invalid_session(format!(
                "command {} targets session {requested}, active session is {}",
                command.name(),
                active.id()
            ))),
            None => Err(Error::invalid_session(format!(
                "command {} targets session {requested}, no session is active",
                command.name()
            ))),
        }
    }

    /// Records a completed handshake.
    pub fn establish(&mut self, id: SessionId, context: Option<&str>) {
        let mut session = Session::new(id);
        if let Some(context) = context {
            session.current_context = context.to_string();
        }
        info!(session_id = %session.id, context = %session.current_context, "Session established");
        self.session = Some(session);
        self.fatal = None;
    }

    /// Threads a context handle returned by the peer.
    pub fn apply_context(&mut self, context: &str) {
        if let Some(session) = self.session.as_mut()
            && session.current_context != context
        {
            debug!(from = %session.current_context, to = %context, "Context changed");
            session.current_context = context.to_string();
        }
    }

    /// Ends the session after an acknowledged teardown.
    pub fn end(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session_id = %session.id, "Session ended");
        }
    }

    /// Drops the session after a session-fatal failure.
    ///
    /// Transport failures are remembered and replayed to later callers.
    pub fn invalidate(&mut self, envelope: &ErrorEnvelope) {
        if let Some(session) = self.session.take() {
            info!(session_id = %session.id, kind = %envelope.kind, "Session invalidated");
        }
        if envelope.kind == ErrorKind::TransportClosed {
            self.fatal = Some(envelope.clone());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
