//! HTTP server with cancellation-aware graceful shutdown.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::{Context, Coordinator, LifecycleState, ShutdownReport};
