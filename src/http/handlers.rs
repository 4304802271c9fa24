//! Request handlers.
//!
//! `/long-task` is the reference for the handler contract: it races its work
//! against the request context and, once canceled, returns without a success
//! response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::http::request::request_id;
use crate::http::response::abandoned;
use crate::http::server::AppState;
use crate::lifecycle::Context;

/// `GET /ping`
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// `GET /`
pub async fn hello(State(state): State<AppState>) -> String {
    let outcome = state.sequence.next_outcome();
    tracing::debug!(outcome = outcome.as_str(), "Incrementing api_calls_total");
    metrics::counter!("api_calls_total", "outcome" => outcome.as_str()).increment(1);
    format!("Hello from {}!\n", state.identity.instance_id)
}

/// `GET /long-task`
pub async fn long_task(State(state): State<AppState>, ctx: Context, headers: HeaderMap) -> Response {
    let request_id = request_id(&headers);
    let work = state.stats.begin();
    tracing::info!(request_id, "Long task started");

    match ctx.run(tokio::time::sleep(state.handlers.long_task())).await {
        Ok(()) => {
            work.complete();
            tracing::info!(request_id, "Long task completed");
            Json(json!({ "status": "completed" })).into_response()
        }
        Err(reason) => {
            work.cancel();
            tracing::info!(request_id, %reason, "Long task canceled");
            abandoned()
        }
    }
}

/// Counts of long-running requests. Accessors only read.
#[derive(Debug, Default)]
pub struct HandlerStats {
    in_flight: AtomicU64,
    completed: AtomicU64,
    canceled: AtomicU64,
}

impl HandlerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a unit of work as started.
    pub fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            stats: Arc::clone(self),
            finished: false,
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn canceled(&self) -> u64 {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A started unit of work. Dropping it unfinished (the client went away and
/// the handler future was dropped) counts as a cancellation.
#[derive(Debug)]
pub struct InFlight {
    stats: Arc<HandlerStats>,
    finished: bool,
}

impl InFlight {
    pub fn complete(mut self) {
        self.finished = true;
        self.stats.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn cancel(mut self) {
        self.finished = true;
        self.stats.canceled.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.stats.canceled.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of a greeting call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
        }
    }
}

/// Server-owned call sequence driving simulated outcomes.
#[derive(Debug, Default)]
pub struct RequestSequence {
    calls: AtomicU64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the sequence and classify the call.
    pub fn next_outcome(&self) -> CallOutcome {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        outcome_for(call, fastrand::u64(0..2))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Every `5 + jitter`-th call fails.
pub fn outcome_for(call: u64, jitter: u64) -> CallOutcome {
    if call % (5 + jitter) == 0 {
        CallOutcome::Failure
    } else {
        CallOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::response::is_abandoned;
    use crate::observability::identity::ServiceIdentity;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn state(long_task_ms: u64) -> AppState {
        let mut config = ServerConfig::default();
        config.handlers.long_task_ms = long_task_ms;
        config.observability.service_instance_id = Some("test-node".into());
        AppState::new(&config, ServiceIdentity::from_config(&config.observability))
    }

    #[test]
    fn outcome_fails_on_multiples() {
        assert_eq!(outcome_for(1, 0), CallOutcome::Success);
        assert_eq!(outcome_for(5, 0), CallOutcome::Failure);
        assert_eq!(outcome_for(5, 1), CallOutcome::Success);
        assert_eq!(outcome_for(6, 1), CallOutcome::Failure);
        assert_eq!(outcome_for(30, 0), CallOutcome::Failure);
        assert_eq!(outcome_for(30, 1), CallOutcome::Failure);
    }

    #[test]
    fn first_four_calls_succeed() {
        let sequence = RequestSequence::new();
        for _ in 0..4 {
            assert_eq!(sequence.next_outcome(), CallOutcome::Success);
        }
        assert_eq!(sequence.calls(), 4);
    }

    #[test]
    fn in_flight_guard_accounting() {
        let stats = Arc::new(HandlerStats::new());

        let a = stats.begin();
        let b = stats.begin();
        let c = stats.begin();
        assert_eq!(stats.in_flight(), 3);

        a.complete();
        b.cancel();
        drop(c);

        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.canceled(), 2);
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let Json(body) = ping().await;
        assert_eq!(body, json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn hello_names_the_instance() {
        let state = state(0);
        let body = hello(State(state.clone())).await;
        assert_eq!(body, "Hello from test-node!\n");
        assert_eq!(state.sequence.calls(), 1);
    }

    #[tokio::test]
    async fn long_task_completes_when_not_canceled() {
        let state = state(10);
        let response = long_task(State(state.clone()), Context::new(), HeaderMap::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!is_abandoned(&response));
        assert_eq!(state.stats.completed(), 1);
    }

    #[tokio::test]
    async fn long_task_abandons_on_cancel() {
        let state = state(60_000);
        let ctx = Context::new();
        let task = tokio::spawn(long_task(State(state.clone()), ctx.clone(), HeaderMap::new()));

        while state.stats.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ctx.cancel();

        let response = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler observed cancellation")
            .unwrap();
        assert!(is_abandoned(&response));
        assert_eq!(state.stats.canceled(), 1);
        assert_eq!(state.stats.completed(), 0);
    }

    #[tokio::test]
    async fn cancellation_wins_over_completed_timer() {
        let state = state(0);
        let ctx = Context::new();
        ctx.cancel();

        let response = long_task(State(state.clone()), ctx, HeaderMap::new()).await;

        assert!(is_abandoned(&response));
        assert_eq!(state.stats.completed(), 0);
    }
}
