//! HTTP server setup and the connection loop.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers and middleware
//! - Accept connections and serve HTTP/1.1 on each
//! - Attach a context derived from the Root Context to every connection at
//!   accept-time, and a per-request child of it to every request
//! - Graceful stop: stop accepting, drain open connections, force-close the
//!   remainder when the deadline elapses
//!
//! # Design Decisions
//! - HTTP/1.1 only: a request's handler runs inside its connection task, so
//!   dropping that task at the deadline stops the handler too. HTTP/2 would
//!   run each stream on a task of its own that outlives the connection.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Request;
use axum::routing::get;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::{HandlerConfig, ServerConfig};
use crate::http::handlers::{self, HandlerStats, RequestSequence};
use crate::http::request::UuidRequestId;
use crate::http::response::{caused_by_abandon, is_abandoned, RequestAbandoned};
use crate::lifecycle::{Context, ShutdownError};
use crate::net::{ConnectionGuard, ConnectionOutcome, ConnectionPermit, ConnectionTracker, Listener};
use crate::observability::identity::ServiceIdentity;
use crate::observability::metrics;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<ServiceIdentity>,
    pub sequence: Arc<RequestSequence>,
    pub stats: Arc<HandlerStats>,
    pub handlers: HandlerConfig,
}

impl AppState {
    pub fn new(config: &ServerConfig, identity: ServiceIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
            sequence: Arc::new(RequestSequence::new()),
            stats: Arc::new(HandlerStats::new()),
            handlers: config.handlers.clone(),
        }
    }
}

/// HTTP server, configured but not yet serving.
pub struct HttpServer {
    routes: Router,
    state: AppState,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ServerConfig, identity: ServiceIdentity) -> Self {
        let state = AppState::new(config, identity);
        let routes = Router::new()
            .route("/", get(handlers::hello))
            .route("/ping", get(handlers::ping))
            .route("/long-task", get(handlers::long_task))
            .with_state(state.clone());

        Self {
            routes,
            state,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Expose the Prometheus recorder on `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.routes = self.routes.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
        self
    }

    /// Add routes served alongside the built-in ones.
    pub fn merge(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    fn layered(routes: Router) -> Router {
        routes
            .layer(axum::middleware::from_fn(metrics::track_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Start accepting on `listener`. Every connection's context derives from
    /// `root`.
    pub fn spawn(self, listener: Listener, root: Context) -> Result<ServerHandle, std::io::Error> {
        let local_addr = listener.local_addr()?;
        let drain = CancellationToken::new();
        let force = CancellationToken::new();
        let tracker = self.tracker.clone();
        let router = Self::layered(self.routes);

        tracing::info!(address = %local_addr, "HTTP server starting");

        let accept_loop = tokio::spawn(accept_loop(
            listener,
            router,
            root,
            tracker.clone(),
            drain.clone(),
            force.clone(),
        ));

        Ok(ServerHandle {
            local_addr,
            drain,
            force,
            tracker,
            accept_loop,
        })
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    drain: CancellationToken,
    force: CancellationToken,
    tracker: ConnectionTracker,
    accept_loop: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Stop accepting and wait for open connections to finish, up to
    /// `deadline`. Connections still open when it is done are dropped.
    ///
    /// The listener is always closed when this returns.
    pub async fn graceful_stop(self, deadline: &Context) -> Result<(), ShutdownError> {
        let ServerHandle {
            drain,
            force,
            tracker,
            mut accept_loop,
            ..
        } = self;

        drain.cancel();

        let result = tokio::select! {
            _ = async {
                let _ = (&mut accept_loop).await;
                tracker.wait_idle().await;
            } => Ok(()),
            _ = deadline.cancelled() => {
                let remaining = tracker.active_count();
                force.cancel();
                Err(ShutdownError::DeadlineExceeded { remaining })
            }
        };

        if !accept_loop.is_finished() {
            let _ = accept_loop.await;
        }
        result
    }
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    root: Context,
    tracker: ConnectionTracker,
    drain: CancellationToken,
    force: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = drain.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let guard = tracker.track();
        let span = tracing::debug_span!(
            "connection",
            connection_id = %guard.id(),
            peer_addr = %peer_addr
        );
        let conn = Connection {
            ctx: root.child(),
            drain: drain.clone(),
            force: force.clone(),
            _guard: guard,
            _permit: permit,
        };
        tokio::spawn(conn.serve(stream, router.clone()).instrument(span));
    }

    tracing::info!("Listener closed; no longer accepting connections");
}

/// Per-connection state, alive for as long as the socket.
struct Connection {
    ctx: Context,
    drain: CancellationToken,
    force: CancellationToken,
    _guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl Connection {
    async fn serve(self, stream: TcpStream, router: Router) {
        let conn_ctx = self.ctx.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(conn_ctx.child());
            let mut router = router.clone();
            async move {
                let response = router
                    .call(request)
                    .await
                    .unwrap_or_else(|never: Infallible| match never {});
                if is_abandoned(&response) {
                    return Err(RequestAbandoned);
                }
                Ok(response)
            }
        });

        let connection = http1::Builder::new()
            .timer(TokioTimer::new())
            .serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        let mut draining = false;
        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.force.cancelled() => break ConnectionOutcome::ForceClosed,
                _ = self.drain.cancelled(), if !draining => {
                    draining = true;
                    connection.as_mut().graceful_shutdown();
                }
                result = connection.as_mut() => break match result {
                    Ok(()) if draining => ConnectionOutcome::Drained,
                    Ok(()) => ConnectionOutcome::Closed,
                    Err(e) if caused_by_abandon(&e) => ConnectionOutcome::Abandoned,
                    Err(e) => ConnectionOutcome::Failed(e.to_string()),
                },
            }
        };

        self.ctx.cancel();

        match &outcome {
            ConnectionOutcome::Failed(error) => {
                tracing::debug!(error = %error, "Connection ended with error");
            }
            ConnectionOutcome::ForceClosed => {
                tracing::warn!("Connection force-closed at shutdown deadline");
            }
            ConnectionOutcome::Abandoned => {
                tracing::debug!("Request abandoned after cancellation; closing connection");
            }
            outcome => tracing::trace!(?outcome, "Connection closed"),
        }
    }
}
