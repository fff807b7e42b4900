//! WebSocket transport and event loop.
//!
//! Each transport spawns one tokio task that owns the socket. The task
//! handles:
//!
//! - Incoming messages from the peer (replies, events)
//! - Outgoing frames queued by callers
//! - Failing every pending request when the connection ends
//!
//! Callers never touch the socket. They register with the
//! [`Correlator`], which queues the stamped frame in the same critical
//! section, then await their reply slot.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CorrelationId, SubscriptionId};
use crate::protocol::{BidiRequest, Event, EventHandler, IncomingMessage, RawReply, TransportKind};

use super::correlator::Correlator;
use super::state::{StateCell, TransportState};
use super::subscriptions::Subscriptions;
use super::{Outbound, Transport, millis};

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write one already-registered request.
    Send { id: CorrelationId, frame: String },
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Multiplexed transport over one WebSocket.
///
/// # Thread Safety
///
/// `WebSocketTransport` is `Send + Sync`; any number of callers may have
/// requests outstanding at once, up to the correlator's pending ceiling.
pub struct WebSocketTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Pending requests (shared with event loop).
    correlator: Arc<Correlator>,
    /// Event callbacks (shared with event loop).
    subscriptions: Arc<Subscriptions>,
    state: Arc<StateCell>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("state", &self.state.get())
            .field("pending", &self.correlator.pending_count())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Connects to a WebSocket endpoint (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the handshake does not finish in time
    /// - [`Error::WebSocket`] if the connection or upgrade fails
    pub async fn connect(url: &str, connect_timeout: Duration, max_pending: usize) -> Result<Self> {
        debug!(url, "Connecting WebSocket transport");

        let (ws_stream, response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::timeout(format!("connect {url}"), millis(connect_timeout)))??;

        debug!(url, status = %response.status(), "WebSocket connection established");
        Ok(Self::from_stream(ws_stream, max_pending))
    }

    /// Wraps an upgraded WebSocket stream and spawns its event loop.
    #[must_use]
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>, max_pending: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new(max_pending));
        let subscriptions = Arc::new(Subscriptions::new());
        let state = Arc::new(StateCell::new(TransportState::Ready));

        let handle = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlator),
            Arc::clone(&subscriptions),
            Arc::clone(&state),
        ));

        Self {
            command_tx,
            correlator,
            subscriptions,
            state,
            event_loop: Mutex::new(Some(handle)),
        }
    }

    /// Encodes a command as a JSON-RPC style request.
    ///
    /// A command aimed at a specific browsing context gets a `context`
    /// parameter unless it already carries one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if encoding fails.
    pub fn encode(id: CorrelationId, outbound: &Outbound<'_>) -> Result<String> {
        let command = outbound.command;
        let mut params = command.parameters().clone();
        if let Some(context) = &command.context().browsing_context_id
            && !params.contains_key("context")
        {
            params.insert("context".to_string(), Value::String(context.to_string()));
        }

        let request = BidiRequest {
            id,
            method: command.name(),
            params,
            session_id: command.session_id(),
        };
        Ok(serde_json::to_string(&request)?)
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Returns `true` if `id` still awaits its reply.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.correlator.contains(id)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlator: Arc<Correlator>,
        subscriptions: Arc<Subscriptions>,
        state: Arc<StateCell>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                // Incoming messages from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlator, &subscriptions);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break "connection closed by peer".to_string();
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break format!("websocket error: {e}");
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break "connection closed by peer".to_string();
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Frames queued by callers
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { id, frame }) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                state.set(TransportState::Closing);
                                correlator.reject(id, Error::transport_closed(e.to_string()));
                                break format!("write failed: {e}");
                            }
                            trace!(request_id = %id, "Request sent");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break "connection closed locally".to_string();
                        }

                        None => {
                            debug!("Command channel closed");
                            break "transport dropped".to_string();
                        }
                    }
                }
            }
        };

        state.set(TransportState::Closing);
        correlator.fail_all(&reason);
        state.set(TransportState::Disconnected);

        debug!(reason, "Event loop terminated");
    }

    /// Routes one incoming text frame.
    fn handle_incoming_message(text: &str, correlator: &Correlator, subscriptions: &Subscriptions) {
        match IncomingMessage::parse(text) {
            Ok(IncomingMessage::Reply { id, payload }) => {
                if !correlator.resolve(id, payload) {
                    debug!(request_id = %id, "Discarded reply without a waiting caller");
                }
            }
            Ok(IncomingMessage::Event(event)) => {
                subscriptions.dispatch(&event);
            }
            Err(e) => {
                warn!(error = %e, text = %text, "Failed to parse incoming message");
            }
        }
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    async fn send(&self, outbound: Outbound<'_>, deadline: Duration) -> Result<RawReply> {
        let (request_id, reply_rx) = self.correlator.register(|id| {
            let frame = Self::encode(id, &outbound)?;
            self.command_tx
                .send(ConnectionCommand::Send { id, frame })
                .map_err(|_| Error::transport_closed("event loop stopped"))
        })?;

        // Dropped with this future, whether it completes, times out or is
        // abandoned by the caller.
        let _pending = self.correlator.guard(request_id);

        trace!(request_id = %request_id, command = %outbound.command.name(), "Request queued");

        match timeout(deadline, reply_rx).await {
            Ok(Ok(Ok(payload))) => Ok(RawReply::new(TransportKind::WebSocket, None, payload)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::transport_closed("reply slot dropped")),
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    command = %outbound.command.name(),
                    "Request timed out"
                );
                Err(Error::request_timeout(request_id, millis(deadline)))
            }
        }
    }

    fn subscribe(&self, event: &str, handler: EventHandler) -> Result<SubscriptionId> {
        Ok(self.subscriptions.add(event, handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(id)
    }

    async fn close(&self) -> Result<()> {
        self.state.transition(TransportState::Ready, TransportState::Closing);
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);

        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Event loop task failed");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
