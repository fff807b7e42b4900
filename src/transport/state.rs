//! Transport lifecycle state.
//!
//! ```text
//! Disconnected → Connecting → Ready → (Busy ⇄ Ready)* → Closing → Disconnected
//! ```
//!
//! `Busy` is only entered by single-outstanding transports (HTTP, socket).
//!
//! Stream transports (socket, WebSocket) are handed out already connected
//! and start in `Ready`. The HTTP transport opens its connection lazily: it
//! starts in `Connecting` and reaches `Ready` with the first response.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

// ============================================================================
// TransportState
// ============================================================================

/// Lifecycle state of one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// No connection.
    Disconnected,
    /// Connection being established.
    Connecting,
    /// Idle and able to send.
    Ready,
    /// One request in flight (single-outstanding transports only).
    Busy,
    /// Shutting down.
    Closing,
}

impl TransportState {
    /// Returns `true` if a command may be sent now or after the current one.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Ready | Self::Busy)
    }

    /// Returns `true` once the transport is shutting down or gone.
    #[inline]
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Disconnected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// StateCell
// ============================================================================

/// Shared, lock-protected [`TransportState`].
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<TransportState>,
}

impl StateCell {
    /// Creates a cell in the given state.
    #[must_use]
    pub const fn new(state: TransportState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn get(&self) -> TransportState {
        *self.state.lock()
    }

    /// Sets the state unconditionally.
    pub fn set(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != next {
            trace!(from = %*state, to = %next, "Transport state");
            *state = next;
        }
    }

    /// Moves to `next` only from `from`; returns whether it moved.
    pub fn transition(&self, from: TransportState, next: TransportState) -> bool {
        let mut state = self.state.lock();
        if *state == from {
            trace!(from = %from, to = %next, "Transport state");
            *state = next;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
