//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (request counters, latency histograms)
//!     → runtime.rs (sampled connection/request/process values)
//!
//! Consumers:
//!     → stdout log stream
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The lifecycle core never calls into this module except to install it
//! - Metrics are cheap (atomic increments); sampling is pull-based

pub mod identity;
pub mod logging;
pub mod metrics;
pub mod runtime;

pub use identity::ServiceIdentity;
