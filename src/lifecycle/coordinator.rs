//! The lifecycle coordinator: binds process lifetime to server lifetime.
//!
//! # State Machine
//! ```text
//! INIT ──start──▶ SERVING ──termination──▶ DRAINING ──stopped + settled──▶ TERMINATED
//! ```
//!
//! No path skips DRAINING; with nothing in flight it is simply short.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;

use crate::config::{ServerConfig, ShutdownConfig};
use crate::http::handlers::HandlerStats;
use crate::http::server::{AppState, HttpServer, ServerHandle};
use crate::lifecycle::context::Context;
use crate::lifecycle::signals::{Termination, TerminationSource};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::identity::ServiceIdentity;
use crate::observability::metrics;
use crate::observability::runtime::{spawn_sampler, RuntimeCatalogue, RuntimeMetric};

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Serving,
    Draining,
    Terminated,
}

/// Failures that abort startup. The process should exit nonzero.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to start server: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the Root Context, the running server and the shutdown bounds.
pub struct Coordinator {
    pub(crate) shutdown: ShutdownConfig,
    pub(crate) root: Context,
    pub(crate) server: ServerHandle,
    pub(crate) app: AppState,
    pub(crate) state: watch::Sender<LifecycleState>,
}

impl Coordinator {
    /// Bind the listener and begin serving in the background.
    pub async fn start(config: ServerConfig) -> Result<Self, StartupError> {
        Self::start_with_routes(config, Router::new()).await
    }

    /// As [`Coordinator::start`], serving `routes` next to the built-in ones.
    pub async fn start_with_routes(config: ServerConfig, routes: Router) -> Result<Self, StartupError> {
        let (state, _) = watch::channel(LifecycleState::Init);
        let root = Context::new();
        let identity = ServiceIdentity::from_config(&config.observability);

        let listener = Listener::bind(&config.listener).await?;

        let mut server = HttpServer::new(&config, identity.clone()).merge(routes);
        let metrics_handle = config
            .observability
            .metrics_enabled
            .then(|| metrics::install_recorder(&identity));
        if let Some(handle) = &metrics_handle {
            server = server.with_metrics(handle.clone());
        }

        let app = server.state().clone();
        let catalogue = runtime_catalogue(Arc::clone(&app.stats), server.tracker().clone());
        let server = server.spawn(listener, root.clone())?;

        if let Some(handle) = metrics_handle {
            spawn_sampler(
                catalogue,
                config.observability.sample_interval(),
                root.clone(),
                Some(handle),
            );
        }

        state.send_replace(LifecycleState::Serving);
        tracing::info!(
            address = %server.local_addr(),
            instance_id = %app.identity.instance_id,
            grace_period_ms = config.shutdown.grace_period_ms,
            settle_interval_ms = config.shutdown.settle_interval_ms,
            "Serving"
        );

        Ok(Self {
            shutdown: config.shutdown,
            root,
            server,
            app,
            state,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// The Root Context shared with every connection.
    pub fn root_context(&self) -> &Context {
        &self.root
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> &Arc<HandlerStats> {
        &self.app.stats
    }

    pub fn connections(&self) -> &ConnectionTracker {
        self.server.tracker()
    }

    /// Wait for the next termination request. `None` means the source is
    /// closed and will never deliver one.
    pub async fn await_signal<S>(&self, source: &mut S) -> Option<Termination>
    where
        S: TerminationSource,
    {
        let received = source.recv().await;
        match received {
            Some(signal) => tracing::info!(%signal, "Termination signal received"),
            None => tracing::warn!("Termination source closed; shutting down"),
        }
        received
    }

    /// Serve until `source` requests termination, then shut down.
    ///
    /// Further requests arriving while draining only repeat the (idempotent)
    /// Root Context cancellation.
    pub async fn run<S>(self, mut source: S) -> crate::lifecycle::ShutdownReport
    where
        S: TerminationSource,
    {
        let signal = self.await_signal(&mut source).await;
        let root = self.root.clone();

        let shutdown = self.shutdown();
        tokio::pin!(shutdown);

        let mut source_open = signal.is_some();
        loop {
            tokio::select! {
                report = &mut shutdown => {
                    return crate::lifecycle::ShutdownReport { signal, ..report };
                }
                repeated = source.recv(), if source_open => match repeated {
                    Some(repeated) => {
                        let canceled = root.cancel();
                        tracing::info!(signal = %repeated, canceled, "Already shutting down");
                    }
                    None => source_open = false,
                },
            }
        }
    }
}

fn runtime_catalogue(stats: Arc<HandlerStats>, tracker: ConnectionTracker) -> RuntimeCatalogue {
    let started = Instant::now();
    let active = tracker.clone();
    let in_flight = Arc::clone(&stats);
    let completed = Arc::clone(&stats);
    let canceled = stats;

    RuntimeCatalogue::new()
        .with(RuntimeMetric::gauge(
            "/server/connections/active:connections",
            "Open client connections.",
            move || active.active_count() as f64,
        ))
        .with(RuntimeMetric::cumulative(
            "/server/connections/accepted:connections",
            "Client connections accepted since start.",
            move || tracker.accepted_total() as f64,
        ))
        .with(RuntimeMetric::gauge(
            "/server/requests/in-flight:requests",
            "Long-running requests currently in progress.",
            move || in_flight.in_flight() as f64,
        ))
        .with(RuntimeMetric::cumulative(
            "/server/requests/completed:requests",
            "Long-running requests that ran to completion.",
            move || completed.completed() as f64,
        ))
        .with(RuntimeMetric::cumulative(
            "/server/requests/canceled:requests",
            "Long-running requests abandoned after cancellation.",
            move || canceled.canceled() as f64,
        ))
        .with(RuntimeMetric::gauge(
            "/process/uptime:seconds",
            "Seconds since the server started.",
            move || started.elapsed().as_secs_f64(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_samples_live_state() {
        let stats = Arc::new(HandlerStats::new());
        let tracker = ConnectionTracker::new();
        let catalogue = runtime_catalogue(Arc::clone(&stats), tracker.clone());

        let _conn = tracker.track();
        let _work = stats.begin();

        let sample = |key: &str| {
            catalogue
                .iter()
                .find(|m| m.key() == key)
                .map(|m| m.sample())
                .unwrap()
        };
        assert_eq!(sample("server_connections_active_connections"), 1.0);
        assert_eq!(sample("server_connections_accepted_connections"), 1.0);
        assert_eq!(sample("server_requests_in_flight_requests"), 1.0);
        assert_eq!(sample("server_requests_canceled_requests"), 0.0);
        assert!(sample("process_uptime_seconds") >= 0.0);
    }
}
