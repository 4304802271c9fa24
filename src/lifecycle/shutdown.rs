//! Shutdown sequence.
//!
//! # Order
//! 1. Cancel the Root Context: every handler watching it starts abandoning work
//! 2. Graceful stop under a fresh deadline of `grace_period`
//! 3. Force-close whatever is still open when the deadline elapses
//! 4. Wait `settle_interval`, then report TERMINATED
//!
//! Nothing in here fails: an exceeded deadline is logged and reported.

use std::time::{Duration, Instant};

use crate::lifecycle::context::Context;
use crate::lifecycle::coordinator::{Coordinator, LifecycleState};
use crate::lifecycle::signals::Termination;

/// Graceful stop could not finish within its bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownError {
    #[error("graceful stop exceeded its deadline; {remaining} connection(s) force-closed")]
    DeadlineExceeded { remaining: usize },
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// The request that started the shutdown, if it came from a source.
    pub signal: Option<Termination>,
    /// Connections dropped when the deadline elapsed; zero for a clean drain.
    pub force_closed: usize,
    /// Time from Root Context cancellation until graceful stop returned.
    pub drain_time: Duration,
    /// Time from Root Context cancellation until TERMINATED.
    pub total_time: Duration,
}

impl ShutdownReport {
    pub fn is_graceful(&self) -> bool {
        self.force_closed == 0
    }
}

impl Coordinator {
    /// Run the shutdown sequence to completion.
    pub async fn shutdown(self) -> ShutdownReport {
        let Coordinator {
            shutdown,
            root,
            server,
            app,
            state,
        } = self;

        let started = Instant::now();
        state.send_replace(LifecycleState::Draining);
        root.cancel();

        tracing::info!(
            grace_period_ms = shutdown.grace_period_ms,
            open_connections = server.tracker().active_count(),
            in_flight = app.stats.in_flight(),
            "Shutting down server"
        );

        let deadline = Context::new().with_timeout(shutdown.grace_period());
        let stopped = server.graceful_stop(&deadline).await;
        drop(deadline);
        let drain_time = started.elapsed();

        let force_closed = match stopped {
            Ok(()) => {
                tracing::info!(drain_ms = drain_time.as_millis() as u64, "Server stopped gracefully");
                0
            }
            Err(e) => {
                tracing::warn!(error = %e, "Server forced to shutdown");
                match e {
                    ShutdownError::DeadlineExceeded { remaining } => remaining,
                }
            }
        };

        tokio::time::sleep(shutdown.settle_interval()).await;

        state.send_replace(LifecycleState::Terminated);
        let total_time = started.elapsed();
        tracing::info!(
            total_ms = total_time.as_millis() as u64,
            canceled = app.stats.canceled(),
            completed = app.stats.completed(),
            "Server exiting"
        );

        ShutdownReport {
            signal: None,
            force_closed,
            drain_time,
            total_time,
        }
    }
}
