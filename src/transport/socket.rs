//! Legacy framed socket transport.
//!
//! One command at a time over a raw stream, each message wrapped in a
//! `Length:` frame (see [`framing`](super::framing)). The protocol has no
//! correlation ids, so the stream lock is held from the write until the
//! reply frame has been read.
//!
//! # Failure Handling
//!
//! | Condition | Result | Transport afterwards |
//! |-----------|--------|----------------------|
//! | EOF or I/O error | `TransportClosed` | closed for every later caller |
//! | Malformed header | `ProtocolViolation` | closed (stream is desynchronized) |
//! | Deadline expired | `Timeout` | usable; the late reply is skipped |
//! | Teardown command | synthetic success | closing, no reply awaited |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{LegacyRequest, RawReply, TransportKind};
use crate::session::NULL_CONTEXT;

use super::framing::{FrameDecoder, encode_frame};
use super::state::{StateCell, TransportState};
use super::{Outbound, Transport, millis};

// ============================================================================
// Constants
// ============================================================================

/// Default read chunk size.
pub const DEFAULT_READ_CHUNK: usize = 4096;

// ============================================================================
// SocketInner
// ============================================================================

/// State guarded by the stream lock.
struct SocketInner<S> {
    stream: S,
    decoder: FrameDecoder,
    /// Replies still owed for commands whose caller gave up.
    stale_replies: usize,
    /// Set once the stream is unusable.
    closed: Option<String>,
}

// ============================================================================
// SocketTransport
// ============================================================================

/// Transport over a raw byte stream using `Length:` framing.
///
/// Generic over the stream so tests can drive it with in-memory pipes.
pub struct SocketTransport<S = TcpStream> {
    inner: Mutex<SocketInner<S>>,
    state: StateCell,
    read_chunk: usize,
}

impl<S> fmt::Debug for SocketTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("state", &self.state.get())
            .field("read_chunk", &self.read_chunk)
            .finish_non_exhaustive()
    }
}

impl SocketTransport<TcpStream> {
    /// Connects to a framed-socket peer.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the connection is not established in time
    /// - [`Error::Io`] if the connection is refused
    pub async fn connect(addr: impl ToSocketAddrs, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("socket connect", millis(connect_timeout)))??;
        stream.set_nodelay(true)?;

        debug!(peer = ?stream.peer_addr().ok(), "Socket transport connected");
        Ok(Self::from_stream(stream))
    }
}

impl<S> SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-connected stream.
    #[must_use]
    pub fn from_stream(stream: S) -> Self {
        Self {
            inner: Mutex::new(SocketInner {
                stream,
                decoder: FrameDecoder::new(),
                stale_replies: 0,
                closed: None,
            }),
            state: StateCell::new(TransportState::Ready),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    /// Sets the read chunk size.
    #[must_use]
    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    /// Encodes a command as a framed legacy request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the parameters cannot be serialized.
    pub fn encode(outbound: &Outbound<'_>) -> Result<Vec<u8>> {
        let command = outbound.command;
        let request = LegacyRequest {
            parameters: command.parameters().values().collect(),
            context: outbound.target_context(),
            element_id: command
                .context()
                .element_id
                .as_ref()
                .map_or(NULL_CONTEXT, |id| id.as_str()),
            command_name: command.name(),
        };
        let body = serde_json::to_vec(&request)?;
        Ok(encode_frame(&body))
    }

    async fn exchange(
        &self,
        inner: &mut SocketInner<S>,
        outbound: Outbound<'_>,
        deadline: Duration,
    ) -> Result<RawReply> {
        let command = outbound.command;
        let frame = Self::encode(&outbound)?;

        if let Err(e) = write_frame(&mut inner.stream, &frame).await {
            return Err(close_with(inner, format!("write failed: {e}")));
        }
        trace!(command = %command.name(), bytes = frame.len(), "Frame written");

        if command.is_terminal() {
            // The peer closes instead of replying.
            self.state.set(TransportState::Closing);
            let _ = inner.stream.shutdown().await;
            inner.closed = Some(format!("session ended by {}", command.name()));
            self.state.set(TransportState::Disconnected);
            debug!(command = %command.name(), "Teardown sent, not awaiting reply");
            return Ok(RawReply::new(
                TransportKind::Socket,
                None,
                json!({"isError": false, "value": null}),
            ));
        }

        let read_chunk = self.read_chunk;
        let body = match timeout(deadline, read_reply(inner, read_chunk)).await {
            Ok(result) => result?,
            Err(_) => {
                inner.stale_replies += 1;
                warn!(
                    command = %command.name(),
                    stale = inner.stale_replies,
                    "Socket reply timed out; late reply will be skipped"
                );
                return Err(Error::timeout(command.name(), millis(deadline)));
            }
        };

        let payload: Value = serde_json::from_slice(&body)?;
        Ok(RawReply::new(TransportKind::Socket, None, payload))
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl<S> Transport for SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    async fn send(&self, outbound: Outbound<'_>, deadline: Duration) -> Result<RawReply> {
        let mut inner = self.inner.lock().await;

        if let Some(reason) = &inner.closed {
            return Err(Error::transport_closed(reason.clone()));
        }

        self.state.set(TransportState::Busy);
        let result = self.exchange(&mut inner, outbound, deadline).await;

        if inner.closed.is_none() {
            self.state.set(TransportState::Ready);
        } else {
            self.state.set(TransportState::Disconnected);
        }
        result
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed.is_some() {
            return Ok(());
        }
        self.state.set(TransportState::Closing);
        let result = inner.stream.shutdown().await;
        inner.closed = Some("closed locally".to_string());
        self.state.set(TransportState::Disconnected);
        debug!("Socket transport closed");
        result.map_err(Error::from)
    }
}

// ============================================================================
// I/O Helpers
// ============================================================================

async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    stream.flush().await
}

/// Reads frames until the one answering the current command.
async fn read_reply<S>(inner: &mut SocketInner<S>, read_chunk: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    loop {
        let body = read_frame(inner, read_chunk).await?;
        if inner.stale_replies == 0 {
            return Ok(body);
        }
        inner.stale_replies -= 1;
        debug!(remaining = inner.stale_replies, "Skipped late reply");
    }
}

async fn read_frame<S>(inner: &mut SocketInner<S>, read_chunk: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; read_chunk];
    loop {
        match inner.decoder.decode() {
            Ok(Some(body)) => return Ok(body),
            Ok(None) => {}
            Err(e) => {
                let message = e.to_string();
                close_with(inner, message);
                return Err(e);
            }
        }

        match inner.stream.read(&mut chunk).await {
            Ok(0) => {
                let reason = if inner.decoder.is_mid_frame() {
                    "connection closed mid-frame"
                } else {
                    "connection closed by peer"
                };
                return Err(close_with(inner, reason.to_string()));
            }
            Ok(n) => {
                trace!(bytes = n, buffered = inner.decoder.buffered() + n, "Read chunk");
                inner.decoder.push(&chunk[..n]);
            }
            // Nothing was consumed, so the read can be repeated.
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(close_with(inner, format!("read failed: {e}"))),
        }
    }
}

fn close_with<S>(inner: &mut SocketInner<S>, reason: String) -> Error {
    warn!(reason = %reason, "Socket transport closed");
    inner.closed = Some(reason.clone());
    Error::transport_closed(reason)
}

// ============================================================================
// Tests
// ============================================================================
