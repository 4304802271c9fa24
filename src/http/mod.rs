//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (+ connection context)
//!     → server.rs (hyper connection, per-request context)
//!     → request.rs (request ID, context extraction)
//!     → handlers.rs
//!     → response.rs (abandoned requests close without a response)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerHandle};
