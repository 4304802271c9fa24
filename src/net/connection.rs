//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Hand out connection IDs for tracing
//! - Count open connections so graceful stop can wait for zero
//! - Record how each connection ended

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Unique identifier for a connection, scoped to one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer closed the connection while serving.
    Closed,
    /// Closed after graceful stop asked it to finish in-flight work.
    Drained,
    /// A handler abandoned its request after cancellation; no response was written.
    Abandoned,
    /// Dropped when the shutdown deadline elapsed.
    ForceClosed,
    /// Protocol or I/O failure.
    Failed(String),
}

/// Tracks open connections for graceful shutdown.
///
/// The open count lives in a watch channel so waiters wake on the transition
/// to zero instead of polling.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
    accepted: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
            accepted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let id = ConnectionId(self.accepted.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.send_modify(|n| *n += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id,
        }
    }

    /// Current open connection count.
    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Total connections accepted since the tracker was created.
    pub fn accepted_total(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Wait until no connections are open.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<usize>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
