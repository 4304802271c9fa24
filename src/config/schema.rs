//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to defaults so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Graceful shutdown bounds.
    pub shutdown: ShutdownConfig,

    /// Demonstration handler settings.
    pub handlers: HandlerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Shutdown timing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on graceful stop before open connections are force-closed.
    pub grace_period_ms: u64,

    /// Fixed wait after graceful stop returns, before the process exits.
    pub settle_interval_ms: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            settle_interval_ms: 2_000,
        }
    }
}

/// Demonstration handler settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HandlerConfig {
    /// How long `/long-task` works before completing.
    pub long_task_ms: u64,
}

impl HandlerConfig {
    pub fn long_task(&self) -> Duration {
        Duration::from_millis(self.long_task_ms)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            // Ten hours: in practice only cancellation ends it.
            long_task_ms: 10 * 60 * 60 * 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,

    /// Runtime metric sampling interval.
    pub sample_interval_ms: u64,

    /// `service.name` label.
    pub service_name: String,

    /// `service.namespace` label.
    pub service_namespace: String,

    /// `service.instance.id` label; host name when unset.
    pub service_instance_id: Option<String>,
}

impl ObservabilityConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            sample_interval_ms: 5_000,
            service_name: "graceful-server".to_string(),
            service_namespace: "default".to_string(),
            service_instance_id: None,
        }
    }
}
