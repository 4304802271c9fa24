//! Cancellable contexts.
//!
//! A [`Context`] is a one-way, broadcast cancellation signal with an attached
//! reason. Contexts form a tree: cancelling a parent cancels every context
//! derived from it, while cancelling a child leaves the parent untouched.
//!
//! ```text
//! root (created once at startup, canceled on termination)
//!   └─ connection (derived at accept-time, canceled when the socket closes)
//!        └─ request (derived per request, released when the handler returns)
//!
//! shutdown deadline (independent root, canceled when the grace period elapses)
//! ```
//!
//! Cancellation is persistent state, not an event: a task that starts waiting
//! after the fact still observes it immediately.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    /// `cancel()` was called on this context or one of its ancestors.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cloneable handle to a cancellable context.
///
/// Clones share the same cancellation state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    parent: Option<Context>,
}

impl Context {
    /// Create a new root context that is only canceled explicitly.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                reason: Arc::new(OnceLock::new()),
                parent: None,
            }),
        }
    }

    /// Derive a child context, canceled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                reason: Arc::new(OnceLock::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Derive a child context that cancels itself with
    /// [`CancelReason::DeadlineExceeded`] once `timeout` elapses.
    ///
    /// The timer is released as soon as the context is done for any reason,
    /// including the last handle being dropped. Must be called from within a
    /// Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let ctx = self.child();
        let token = ctx.inner.token.clone();
        let reason = Arc::clone(&ctx.inner.reason);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = reason.set(CancelReason::DeadlineExceeded);
                    token.cancel();
                }
            }
        });

        ctx
    }

    /// Cancel this context and everything derived from it.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition; later calls, or calls on an already-done context, are
    /// no-ops returning `false`.
    pub fn cancel(&self) -> bool {
        if self.inner.token.is_cancelled() {
            return false;
        }
        let first = self.inner.reason.set(CancelReason::Canceled).is_ok();
        self.inner.token.cancel();
        first
    }

    /// Whether the context is done.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The reason the context is done, or `None` while it is still active.
    pub fn err(&self) -> Option<CancelReason> {
        if !self.inner.token.is_cancelled() {
            return None;
        }
        if let Some(reason) = self.inner.reason.get() {
            return Some(*reason);
        }
        self.inner
            .parent
            .as_ref()
            .and_then(Context::err)
            .or(Some(CancelReason::Canceled))
    }

    /// Resolves once the context is done.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + '_ {
        self.inner.token.cancelled()
    }

    /// Drive `work` until it completes or the context is done.
    ///
    /// Cancellation is polled first, so when both are ready in the same poll
    /// the result is always `Err`.
    pub async fn run<F>(&self, work: F) -> Result<F::Output, CancelReason>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.inner.token.cancelled() => {
                Err(self.err().unwrap_or(CancelReason::Canceled))
            }
            output = work => Ok(output),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.err())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Releases any deadline timer still waiting on this token.
        self.token.cancel();
    }
}
