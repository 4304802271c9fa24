//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Resolve and bind the configured address (failure here is fatal at startup)
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//!
//! # Design Decisions
//! - `host:port` is resolved with the runtime's resolver; `:port` binds all
//!   interfaces

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The bind address did not resolve to any socket address.
    #[error("cannot resolve bind address {address:?}: {source}")]
    Resolve {
        address: String,
        source: std::io::Error,
    },
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(std::io::Error),
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let resolve_error = |source: std::io::Error| ListenerError::Resolve {
            address: config.bind_address.clone(),
            source,
        };
        let target = bind_target(&config.bind_address);
        let candidates: Vec<SocketAddr> = lookup_host(&*target)
            .await
            .map_err(resolve_error)?
            .collect();
        if candidates.is_empty() {
            return Err(resolve_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses found",
            )));
        }

        let listener = TcpListener::bind(candidates.as_slice())
            .await
            .map_err(|source| ListenerError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;

        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure). The semaphore is owned here and
        // never closed.
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::other(e)))?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

/// `:port` means every interface.
fn bind_target(address: &str) -> Cow<'_, str> {
    if address.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{address}"))
    } else {
        Cow::Borrowed(address)
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
