//! Command dispatcher.
//!
//! The [`Dispatcher`] is the single entry point callers use. It owns the
//! active transport and the session context, and turns every command into
//! either a success value or a typed [`ErrorEnvelope`].
//!
//! # Example
//!
//! ```no_run
//! use driver_wire::Dispatcher;
//! use serde_json::json;
//!
//! # async fn example() -> driver_wire::Result<()> {
//! let dispatcher = Dispatcher::builder()
//!     .http("http://127.0.0.1:4444")
//!     .build()
//!     .await?;
//!
//! dispatcher
//!     .execute(dispatcher.command("newSession").with_param("capabilities", json!({})))
//!     .await?;
//!
//! let title = dispatcher.execute(dispatcher.command("getTitle")).await?;
//! println!("{title}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, trace, warn};

use crate::error::{CommandResult, Error, ErrorEnvelope, ErrorKind, Result};
use crate::identifiers::{SessionId, SubscriptionId};
use crate::protocol::{Command, Event, EventHandler, RawReply, TransportKind};
use crate::session::{Session, SessionContext};
use crate::transport::{Outbound, Transport, TransportState};
use crate::translate::ErrorTranslator;

use super::builder::DispatcherBuilder;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the dispatcher.
pub(crate) struct DispatcherInner {
    /// Active transport.
    pub transport: Box<dyn Transport>,

    /// Session and context, read before and written after each exchange.
    pub session: Mutex<SessionContext>,

    /// Reply error mapping.
    pub translator: ErrorTranslator,

    /// Serializes callers on single-outstanding transports.
    pub exchange: AsyncMutex<()>,

    /// Default deadline per command.
    pub command_timeout: Duration,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Executes commands over one transport.
///
/// Cloning is cheap; clones share the same connection and session.
///
/// # Concurrency
///
/// On HTTP and the legacy socket, concurrent callers are served one at a
/// time in lock order, so each sees the context left by the previous reply.
/// On WebSocket, callers proceed concurrently and replies are paired by
/// correlation id.
#[derive(Clone)]
pub struct Dispatcher {
    /// Shared inner state.
    pub(crate) inner: Arc<DispatcherInner>,
}

// ============================================================================
// Dispatcher - Display
// ============================================================================

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.inner.transport.kind())
            .field("state", &self.inner.transport.state())
            .field("session", &self.session().map(|s| s.id().clone()))
            .field("command_timeout", &self.inner.command_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Dispatcher - Construction
// ============================================================================

impl Dispatcher {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Wraps an already-connected transport.
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        translator: ErrorTranslator,
        command_timeout: Duration,
    ) -> Self {
        debug!(
            transport = %transport.kind(),
            timeout_ms = crate::transport::millis(command_timeout),
            rules = translator.rules().len(),
            "Dispatcher ready"
        );

        Self {
            inner: Arc::new(DispatcherInner {
                transport,
                session: Mutex::new(SessionContext::new()),
                translator,
                exchange: AsyncMutex::new(()),
                command_timeout,
            }),
        }
    }
}

// ============================================================================
// Dispatcher - Execution
// ============================================================================

impl Dispatcher {
    /// Executes a command with the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorEnvelope`] whose kind says what went wrong:
    /// a peer-reported failure, a timeout, a closed transport, or a command
    /// without a valid session.
    pub async fn execute(&self, command: Command) -> CommandResult<Value> {
        self.execute_with_timeout(command, self.inner.command_timeout)
            .await
    }

    /// Executes a command with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> CommandResult<Value> {
        trace!(command = %command.name(), "Executing command");

        // Single-outstanding transports hold this from context read to
        // context write.
        let _exchange = if self.inner.transport.kind().is_multiplexed() {
            None
        } else {
            Some(self.inner.exchange.lock().await)
        };

        let current_context = {
            let session = self.inner.session.lock();
            session.validate(&command).map_err(Error::into_envelope)?;
            session.current_context().to_string()
        };

        let outcome = self
            .inner
            .transport
            .send(Outbound::new(&command, &current_context), timeout)
            .await
            .and_then(|reply| self.complete(&command, reply));

        outcome.map_err(|e| self.fail(&command, e))
    }

    /// Builds a command pre-stamped with the active session.
    #[must_use]
    pub fn command(&self, name: impl Into<String>) -> Command {
        let command = Command::new(name);
        match self.inner.session.lock().session() {
            Some(session) => command.with_session(session.id().clone()),
            None => command,
        }
    }

    /// Applies a decoded reply to the session and unwraps its value.
    fn complete(&self, command: &Command, reply: RawReply) -> Result<Value> {
        if reply.is_error() {
            return Err(Error::Remote(self.inner.translator.translate(&reply)));
        }

        {
            let mut session = self.inner.session.lock();
            if command.is_handshake() {
                let id = reply.session_id().unwrap_or_else(SessionId::generate);
                session.establish(id, reply.context());
            } else if command.is_terminal() {
                session.end();
            } else if let Some(context) = reply.context() {
                session.apply_context(context);
            }
        }

        Ok(reply.into_value())
    }

    /// Converts a failure to an envelope, invalidating the session if fatal.
    ///
    /// A `TransportClosed` failure only ends the session when the transport
    /// itself is gone; a dropped HTTP request leaves the transport usable.
    fn fail(&self, command: &Command, error: Error) -> ErrorEnvelope {
        let envelope = error.into_envelope();

        let fatal = match envelope.kind {
            ErrorKind::TransportClosed => self.inner.transport.state().is_closed(),
            _ => envelope.is_session_fatal(),
        };

        if fatal {
            warn!(
                command = %command.name(),
                kind = %envelope.kind,
                message = %envelope.message,
                "Session-fatal failure"
            );
            self.inner.session.lock().invalidate(&envelope);
        } else {
            debug!(
                command = %command.name(),
                kind = %envelope.kind,
                message = %envelope.message,
                "Command failed"
            );
        }

        envelope
    }
}

// ============================================================================
// Dispatcher - Events
// ============================================================================

impl Dispatcher {
    /// Registers a callback for an event name, or `"*"` for all events.
    ///
    /// The callback runs on the transport's reader task and must not block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] on transports without events.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> Result<SubscriptionId> {
        self.inner.transport.subscribe(event, handler)
    }

    /// Registers a subscription delivered as a stream of events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] on transports without events.
    pub fn subscribe_stream(
        &self,
        event: &str,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |event: &Event| {
            let _ = tx.send(event.clone());
        });
        let id = self.inner.transport.subscribe(event, handler)?;
        Ok((id, rx))
    }

    /// Removes a subscription; returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.transport.unsubscribe(id)
    }
}

// ============================================================================
// Dispatcher - Accessors
// ============================================================================

impl Dispatcher {
    /// Returns a snapshot of the active session.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.session.lock().session().cloned()
    }

    /// Returns the current context handle.
    #[must_use]
    pub fn current_context(&self) -> String {
        self.inner.session.lock().current_context().to_string()
    }

    /// Returns the transport variant.
    #[inline]
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Returns the transport's lifecycle state.
    #[inline]
    #[must_use]
    pub fn transport_state(&self) -> TransportState {
        self.inner.transport.state()
    }

    /// Returns the default command deadline.
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }

    /// Closes the transport and forgets the session.
    ///
    /// # Errors
    ///
    /// Returns the transport's shutdown error, if any.
    pub async fn close(&self) -> Result<()> {
        let result = self.inner.transport.close().await;
        self.inner.session.lock().end();
        debug!(transport = %self.inner.transport.kind(), "Dispatcher closed");
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::protocol::names;

    /// Replays scripted replies and records what was sent.
    ///
    /// A scripted `TransportClosed` failure also closes the transport unless
    /// it was built with `survives_failures`.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<RawReply>>>,
        sent: Mutex<Vec<(String, String)>>,
        state: Mutex<TransportState>,
        survives_failures: bool,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<RawReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
                state: Mutex::new(TransportState::Ready),
                survives_failures: false,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }

        fn state(&self) -> TransportState {
            *self.state.lock()
        }

        async fn send(&self, outbound: Outbound<'_>, _timeout: Duration) -> Result<RawReply> {
            self.sent.lock().push((
                outbound.command.name().to_string(),
                outbound.current_context.to_string(),
            ));
            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::transport_closed("script exhausted")));
            if let Err(e) = &reply
                && e.is_connection_error()
                && !self.survives_failures
            {
                *self.state.lock() = TransportState::Disconnected;
            }
            reply
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn socket_reply(payload: Value) -> Result<RawReply> {
        Ok(RawReply::new(TransportKind::Socket, None, payload))
    }

    fn dispatcher(replies: Vec<Result<RawReply>>) -> Dispatcher {
        Dispatcher::new(
            Box::new(ScriptedTransport::new(replies)),
            ErrorTranslator::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_command_without_session_rejected_locally() {
        let d = dispatcher(vec![]);
        let err = d.execute(Command::new("getTitle")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSession);
    }

    #[tokio::test]
    async fn test_handshake_establishes_session_and_context() {
        let d = dispatcher(vec![
            socket_reply(json!({"isError": false, "context": "ctx-1", "value": {"sessionId": "s-1"}})),
            socket_reply(json!({"isError": false, "context": "ctx-1", "value": "Title"})),
        ]);

        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");
        let session = d.session().expect("session");
        assert_eq!(session.id().as_str(), "s-1");
        assert_eq!(d.current_context(), "ctx-1");

        let title = d.execute(d.command("getTitle")).await.expect("title");
        assert_eq!(title, json!("Title"));
    }

    #[tokio::test]
    async fn test_handshake_without_session_id_generates_one() {
        let d = dispatcher(vec![socket_reply(json!({"isError": false, "context": "c"}))]);
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");
        assert!(!d.session().expect("session").id().as_str().is_empty());
    }

    #[tokio::test]
    async fn test_error_reply_translated() {
        let d = dispatcher(vec![
            socket_reply(json!({"isError": false, "context": "c", "value": {"sessionId": "s"}})),
            socket_reply(json!({"isError": true, "value": {"error": "no such element", "message": "gone"}})),
        ]);
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");

        let err = d.execute(d.command("findElement")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);
        assert!(err.raw_payload.is_some());
        assert!(d.session().is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_invalidates_and_replays() {
        let d = dispatcher(vec![
            socket_reply(json!({"isError": false, "context": "c", "value": {"sessionId": "s"}})),
            Err(Error::transport_closed("connection closed mid-frame")),
        ]);
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");

        let first = d.execute(d.command("getTitle")).await.unwrap_err();
        assert_eq!(first.kind, ErrorKind::TransportClosed);
        assert!(d.session().is_none());

        let replay = d
            .execute(Command::new("getTitle").with_session("s"))
            .await
            .unwrap_err();
        assert_eq!(replay, first);
    }

    #[tokio::test]
    async fn test_request_failure_on_live_transport_keeps_session() {
        let transport = ScriptedTransport {
            survives_failures: true,
            ..ScriptedTransport::new(vec![
                socket_reply(json!({"isError": false, "context": "c", "value": {"sessionId": "s"}})),
                Err(Error::transport_closed("connection reset")),
                socket_reply(json!({"isError": false, "value": "Title"})),
            ])
        };
        let d = Dispatcher::new(
            Box::new(transport),
            ErrorTranslator::default(),
            Duration::from_secs(5),
        );
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");

        let err = d.execute(d.command("navigateTo")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportClosed);
        assert!(d.session().is_some());

        let title = d.execute(d.command("getTitle")).await.expect("title");
        assert_eq!(title, json!("Title"));
    }

    #[tokio::test]
    async fn test_mismatched_session_does_not_invalidate() {
        let d = dispatcher(vec![socket_reply(
            json!({"isError": false, "context": "c", "value": {"sessionId": "s"}}),
        )]);
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");

        let err = d
            .execute(Command::new("getTitle").with_session("other"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSession);
        assert!(d.session().is_some());
    }

    #[tokio::test]
    async fn test_teardown_ends_session() {
        let d = dispatcher(vec![
            socket_reply(json!({"isError": false, "context": "c", "value": {"sessionId": "s"}})),
            socket_reply(json!({"isError": false, "value": null})),
        ]);
        d.execute(Command::new(names::NEW_SESSION)).await.expect("handshake");
        d.execute(d.command(names::QUIT)).await.expect("quit");
        assert!(d.session().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_unsupported_on_socket() {
        let d = dispatcher(vec![]);
        let err = d.subscribe_stream("log.entryAdded").unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        assert!(!d.unsubscribe(SubscriptionId::new(1)));
    }
}
