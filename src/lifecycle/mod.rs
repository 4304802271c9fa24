//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (coordinator.rs):
//!     Create Root Context → Bind listener → Serve in background → SERVING
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Termination event → coordinator
//!
//! Shutdown (shutdown.rs):
//!     Cancel Root Context → Graceful stop (bounded) → Settle → TERMINATED
//! ```
//!
//! # Design Decisions
//! - Bind failure is the only fatal error
//! - Root Context is canceled before graceful stop begins
//! - Shutdown has a deadline: connections still open are force-closed

pub mod context;
pub mod coordinator;
pub mod shutdown;
pub mod signals;

pub use context::{CancelReason, Context};
pub use coordinator::{Coordinator, LifecycleState, StartupError};
pub use shutdown::{ShutdownError, ShutdownReport};
pub use signals::{ManualTermination, Termination, TerminationSender, TerminationSignals, TerminationSource};
