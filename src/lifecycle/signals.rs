//! OS signal handling.
//!
//! # Responsibilities
//! - Register interest in SIGINT and SIGTERM before serving starts
//! - Translate delivered signals into [`Termination`] events
//!
//! Signal delivery does nothing but yield an event; the coordinator turns the
//! first event into a Root Context cancellation. Tests drive the same path
//! with [`ManualTermination`] instead of real signals.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

/// A request to terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Interrupt => f.write_str("interrupt"),
            Termination::Terminate => f.write_str("terminate"),
        }
    }
}

/// A stream of termination requests.
///
/// `recv` yields `None` once the source can never deliver another event.
pub trait TerminationSource {
    fn recv(&mut self) -> impl Future<Output = Option<Termination>> + Send;
}

/// Termination requests delivered by the operating system.
#[cfg(unix)]
pub struct TerminationSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    /// Install the SIGINT and SIGTERM handlers.
    ///
    /// Once installed, these signals no longer terminate the process by
    /// default; they are only observable through [`TerminationSource::recv`].
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt = signal(SignalKind::interrupt())?;
        let terminate = signal(SignalKind::terminate())?;
        tracing::debug!("Termination signal handlers installed");
        Ok(Self {
            interrupt,
            terminate,
        })
    }
}

#[cfg(unix)]
impl TerminationSource for TerminationSignals {
    async fn recv(&mut self) -> Option<Termination> {
        tokio::select! {
            received = self.interrupt.recv() => received.map(|()| Termination::Interrupt),
            received = self.terminate.recv() => received.map(|()| Termination::Terminate),
        }
    }
}

/// Termination requests delivered by the operating system.
#[cfg(not(unix))]
pub struct TerminationSignals {
    _private: (),
}

#[cfg(not(unix))]
impl TerminationSignals {
    /// Install the Ctrl-C handler.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self { _private: () })
    }
}

#[cfg(not(unix))]
impl TerminationSource for TerminationSignals {
    async fn recv(&mut self) -> Option<Termination> {
        tokio::signal::ctrl_c().await.ok().map(|()| Termination::Interrupt)
    }
}

/// A termination source fed by hand.
pub struct ManualTermination {
    rx: mpsc::UnboundedReceiver<Termination>,
}

/// Sending half of a [`ManualTermination`].
#[derive(Debug, Clone)]
pub struct TerminationSender {
    tx: mpsc::UnboundedSender<Termination>,
}

impl ManualTermination {
    pub fn channel() -> (TerminationSender, ManualTermination) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TerminationSender { tx }, ManualTermination { rx })
    }
}

impl TerminationSender {
    /// Deliver a termination request. Returns `false` if the receiving side
    /// is gone.
    pub fn send(&self, termination: Termination) -> bool {
        self.tx.send(termination).is_ok()
    }
}

impl TerminationSource for ManualTermination {
    async fn recv(&mut self) -> Option<Termination> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_source_delivers_in_order() {
        let (tx, mut source) = ManualTermination::channel();
        assert!(tx.send(Termination::Terminate));
        assert!(tx.send(Termination::Interrupt));

        assert_eq!(source.recv().await, Some(Termination::Terminate));
        assert_eq!(source.recv().await, Some(Termination::Interrupt));
    }

    #[tokio::test]
    async fn manual_source_ends_when_sender_dropped() {
        let (tx, mut source) = ManualTermination::channel();
        drop(tx);
        assert_eq!(source.recv().await, None);
    }

    #[test]
    fn termination_display() {
        assert_eq!(Termination::Interrupt.to_string(), "interrupt");
        assert_eq!(Termination::Terminate.to_string(), "terminate");
    }
}
