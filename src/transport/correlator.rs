//! Correlation table for multiplexed replies.
//!
//! Every outstanding WebSocket request owns one entry keyed by its
//! [`CorrelationId`]. The id is allocated, the entry inserted and the frame
//! handed to the writer under a single lock, so a reply can never arrive for
//! an id the table does not yet know.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
pub const DEFAULT_MAX_PENDING: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Receiving half handed to the caller of [`Correlator::register`].
pub type ReplyReceiver = oneshot::Receiver<Result<Value>>;

/// One outstanding request.
#[derive(Debug)]
struct PendingRequest {
    issued_at: Instant,
    slot: oneshot::Sender<Result<Value>>,
}

#[derive(Debug)]
struct Table {
    next_id: u64,
    pending: FxHashMap<CorrelationId, PendingRequest>,
    /// Set once the connection is gone; refuses new registrations.
    closed: Option<String>,
}

// ============================================================================
// Correlator
// ============================================================================

/// Map of outstanding requests to their completion slots.
///
/// # Thread Safety
///
/// Shared between caller tasks (register, cancel) and the reader task
/// (resolve, fail_all). Every operation takes the lock briefly and never
/// across an await point.
#[derive(Debug)]
pub struct Correlator {
    table: Mutex<Table>,
    max_pending: usize,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl Correlator {
    /// Creates an empty table; ids start at 1.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            table: Mutex::new(Table {
                next_id: 1,
                pending: FxHashMap::default(),
                closed: None,
            }),
            max_pending: max_pending.max(1),
        }
    }

    /// Allocates an id, records the pending request and runs `transmit`.
    ///
    /// `transmit` runs while the table is locked; it must only enqueue the
    /// frame, never wait on I/O. If it fails the entry is removed again.
    ///
    /// # Errors
    ///
    /// - [`Error::TransportClosed`] after [`fail_all`](Self::fail_all)
    /// - [`Error::TooManyPending`] at the pending ceiling
    /// - whatever `transmit` returns
    pub fn register<F>(&self, transmit: F) -> Result<(CorrelationId, ReplyReceiver)>
    where
        F: FnOnce(CorrelationId) -> Result<()>,
    {
        let mut table = self.table.lock();

        if let Some(reason) = &table.closed {
            return Err(Error::transport_closed(reason.clone()));
        }

        if table.pending.len() >= self.max_pending {
            warn!(
                pending = table.pending.len(),
                max = self.max_pending,
                "Too many pending requests"
            );
            return Err(Error::TooManyPending {
                pending: table.pending.len(),
                max: self.max_pending,
            });
        }

        let id = CorrelationId::new(table.next_id);
        table.next_id += 1;

        let (slot, rx) = oneshot::channel();
        table.pending.insert(
            id,
            PendingRequest {
                issued_at: Instant::now(),
                slot,
            },
        );

        if let Err(e) = transmit(id) {
            table.pending.remove(&id);
            return Err(e);
        }

        trace!(%id, pending = table.pending.len(), "Request registered");
        Ok((id, rx))
    }

    /// Completes the request with a reply payload.
    ///
    /// Returns `false` for ids that are unknown, already completed or
    /// cancelled; such replies are dropped.
    pub fn resolve(&self, id: CorrelationId, payload: Value) -> bool {
        self.complete(id, Ok(payload))
    }

    /// Completes the request with an error.
    pub fn reject(&self, id: CorrelationId, error: Error) -> bool {
        self.complete(id, Err(error))
    }

    /// Removes the entry without completing it.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let removed = self.table.lock().pending.remove(&id);
        if removed.is_some() {
            debug!(%id, "Removed abandoned correlation");
        }
        removed.is_some()
    }

    /// Fails every pending request and refuses new ones.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            table.closed.get_or_insert_with(|| reason.to_string());
            table.pending.drain().collect()
        };

        let count = drained.len();
        for (_, request) in drained {
            let _ = request.slot.send(Err(Error::transport_closed(reason)));
        }

        if count > 0 {
            debug!(count, reason, "Failed pending requests on shutdown");
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.table.lock().pending.contains_key(&id)
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.table.lock().closed.is_some()
    }

    fn complete(&self, id: CorrelationId, result: Result<Value>) -> bool {
        let Some(request) = self.table.lock().pending.remove(&id) else {
            warn!(%id, "Reply for unknown request");
            return false;
        };

        trace!(%id, elapsed = ?request.issued_at.elapsed(), "Reply correlated");
        // The caller may already have given up; nothing to do then.
        let _ = request.slot.send(result);
        true
    }

    /// Returns a guard that cancels `id` when dropped.
    ///
    /// Held by the caller while it awaits the reply, so a dropped or
    /// aborted caller never leaves its entry behind.
    #[must_use]
    pub fn guard(&self, id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard {
            correlator: self,
            id,
        }
    }

    /// Age of the oldest pending request.
    #[must_use]
    pub fn oldest_pending(&self) -> Option<Duration> {
        self.table
            .lock()
            .pending
            .values()
            .map(|request| request.issued_at.elapsed())
            .max()
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes one pending entry on drop.
///
/// A no-op if the entry was already resolved, rejected or failed.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
