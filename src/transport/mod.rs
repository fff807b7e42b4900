//! Transport layer.
//!
//! Each transport owns one physical connection, encodes a [`Command`] with
//! its own wire rules, and decodes replies into a [`RawReply`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Outbound    ┌───────────────────┐        ┌──────────────┐
//! │  Dispatcher  │──────────────►│ Transport         │───────►│ Remote end   │
//! │              │◄──────────────│  Http | Socket    │◄───────│ (driver or   │
//! │              │   RawReply    │  | WebSocket      │        │  extension)  │
//! └──────────────┘               └───────────────────┘        └──────────────┘
//! ```
//!
//! # Concurrency Discipline
//!
//! | Transport | Outstanding requests | Discipline |
//! |-----------|----------------------|------------|
//! | `HttpTransport` | one | exchange lock held for the full round trip |
//! | `SocketTransport` | one | stream lock held for write + framed read |
//! | `WebSocketTransport` | many | correlation table + one reader task |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlator` | Correlation table for multiplexed replies |
//! | `framing` | `Length:` frame codec |
//! | `http` | HTTP+JSON transport |
//! | `server` | Accepts inbound WebSocket connections (extension mode) |
//! | `socket` | Legacy framed socket transport |
//! | `state` | Lifecycle state machine |
//! | `subscriptions` | Event subscriber registry |
//! | `websocket` | WebSocket transport and reader loop |

// ============================================================================
// Submodules
// ============================================================================

/// Correlation table for multiplexed replies.
pub mod correlator;

/// `Length:` frame codec.
pub mod framing;

/// HTTP+JSON transport.
pub mod http;

/// WebSocket server for extension-initiated connections.
pub mod server;

/// Legacy framed socket transport.
pub mod socket;

/// Transport lifecycle state.
pub mod state;

/// Event subscriber registry.
pub mod subscriptions;

/// WebSocket transport and reader loop.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{Command, EventHandler, RawReply, TransportKind};

// ============================================================================
// Re-exports
// ============================================================================

pub use correlator::Correlator;
pub use http::HttpTransport;
pub use server::PendingServer;
pub use socket::SocketTransport;
pub use state::TransportState;
pub use subscriptions::Subscriptions;
pub use websocket::WebSocketTransport;

// ============================================================================
// Outbound
// ============================================================================

/// A command together with the per-connection state it is sent under.
#[derive(Debug, Clone, Copy)]
pub struct Outbound<'a> {
    /// The command.
    pub command: &'a Command,
    /// Context handle from the last reply, `"null"` before one is known.
    pub current_context: &'a str,
}

impl<'a> Outbound<'a> {
    /// Pairs a command with the current context.
    #[inline]
    #[must_use]
    pub fn new(command: &'a Command, current_context: &'a str) -> Self {
        Self {
            command,
            current_context,
        }
    }

    /// Context to stamp on the command: explicit target first, then current.
    #[inline]
    #[must_use]
    pub fn target_context(&self) -> &'a str {
        self.command
            .context()
            .browsing_context_id
            .as_ref()
            .map_or(self.current_context, |id| id.as_str())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One physical channel to the remote end.
///
/// Implementations are `Send + Sync` and shared behind the dispatcher.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport variant.
    fn kind(&self) -> TransportKind;

    /// Returns the lifecycle state.
    fn state(&self) -> TransportState;

    /// Sends one command and waits for its reply.
    ///
    /// Failed replies are returned as `Ok(RawReply)`; `Err` is reserved for
    /// local and transport failures.
    async fn send(&self, outbound: Outbound<'_>, timeout: Duration) -> Result<RawReply>;

    /// Registers an event callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] on transports without events.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Result<SubscriptionId> {
        let _ = handler;
        Err(Error::unsupported(
            self.kind().name(),
            format!("subscribe({event})"),
        ))
    }

    /// Removes an event callback; returns whether it existed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let _ = id;
        false
    }

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Milliseconds in a duration, saturating.
#[inline]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
