//! Single-use TCP listener that a companion device dials after scanning a code.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► header() ──► accept_next() ──► dispose()
//!   bind         pure        one peer         idempotent
//! ```
//!
//! One listener is opened per slow-path dispatch through an
//! [`EndpointFactory`], and disposed when the session resolves.  Disposing
//! while an `accept_next` is pending makes that call resolve with
//! [`ListenerError::Cancelled`].
//!
//! The dispatcher depends only on the [`PeerEndpoint`] and
//! [`EndpointFactory`] traits, so tests can substitute in-memory endpoints
//! and count how many listeners were created.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lockall_core::{Channel, Header, HeaderError};

use super::interface::candidate_addresses;
use super::socket_channel::SocketChannel;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors from opening or using a [`SocketListener`].
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The host has no IPv4 interface to advertise.
    #[error("no IPv4 network interface available to advertise")]
    NoInterfaceFound,

    /// The listening socket could not be bound.
    #[error("failed to bind listener on {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The listener was disposed or the caller cancelled.
    #[error("accept cancelled")]
    Cancelled,

    /// No peer connected before the deadline.
    #[error("no peer connected within {0:?}")]
    TimedOut(Duration),

    /// The OS reported an accept failure.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
}

impl ListenerError {
    /// `true` for setup failures that disable code-based pairing without
    /// being fatal to the host.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::NoInterfaceFound | Self::BindFailure { .. })
    }
}

impl From<HeaderError> for ListenerError {
    fn from(_: HeaderError) -> Self {
        Self::NoInterfaceFound
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Where a [`SocketListener`] binds and what address it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Local address to bind; the port is always OS-assigned.
    pub bind_address: IpAddr,

    /// Address placed in the header.  `None` means discover it.
    pub advertise_address: Option<Ipv4Addr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_address: None,
        }
    }
}

// ── Endpoint traits ───────────────────────────────────────────────────────────

/// A place a single companion connection can arrive at.
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// The header describing how to reach this endpoint.
    ///
    /// # Errors
    ///
    /// [`ListenerError::NoInterfaceFound`] when no address can be advertised.
    fn header(&self) -> Result<Header, ListenerError>;

    /// Waits for exactly one peer and returns a channel to it.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Cancelled`] on dispose or cancellation,
    /// [`ListenerError::TimedOut`] once `deadline` elapses.
    async fn accept_next(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Channel>, ListenerError>;

    /// Releases the endpoint.  Safe to call more than once.
    fn dispose(&self);
}

/// Creates a fresh [`PeerEndpoint`] per slow-path dispatch.
#[async_trait]
pub trait EndpointFactory: Send + Sync {
    /// # Errors
    ///
    /// [`ListenerError::BindFailure`] when the endpoint cannot be opened.
    async fn open(&self) -> Result<Box<dyn PeerEndpoint>, ListenerError>;
}

// ── Socket listener ───────────────────────────────────────────────────────────

/// A TCP listener on an ephemeral port.
pub struct SocketListener {
    listener: Mutex<Option<Arc<TcpListener>>>,
    port: u16,
    candidates: Vec<IpAddr>,
    disposed: CancellationToken,
}

impl SocketListener {
    /// Binds an OS-assigned port on `config.bind_address` and discovers the
    /// interface to advertise.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::BindFailure`] if the socket cannot be bound.
    pub async fn start(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = SocketAddr::new(config.bind_address, 0);
        let bind_failure = |source| ListenerError::BindFailure { addr, source };

        let listener = TcpListener::bind(addr).await.map_err(bind_failure)?;
        let port = listener.local_addr().map_err(bind_failure)?.port();
        let candidates = candidate_addresses(config.advertise_address);
        info!("pairing listener bound on {}:{port}", config.bind_address);

        Ok(Self {
            listener: Mutex::new(Some(Arc::new(listener))),
            port,
            candidates,
            disposed: CancellationToken::new(),
        })
    }

    /// The OS-assigned port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    fn live_listener(&self) -> Option<Arc<TcpListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PeerEndpoint for SocketListener {
    fn header(&self) -> Result<Header, ListenerError> {
        Ok(Header::for_first_ipv4(
            self.candidates.iter().copied(),
            self.port,
        )?)
    }

    async fn accept_next(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Channel>, ListenerError> {
        let listener = self.live_listener().ok_or(ListenerError::Cancelled)?;

        tokio::select! {
            _ = self.disposed.cancelled() => Err(ListenerError::Cancelled),
            _ = cancel.cancelled() => Err(ListenerError::Cancelled),
            _ = tokio::time::sleep(deadline) => Err(ListenerError::TimedOut(deadline)),
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(ListenerError::Accept)?;
                info!("companion connected from {peer}");
                let channel: Arc<dyn Channel> = Arc::new(SocketChannel::new(stream, peer));
                Ok(channel)
            }
        }
    }

    fn dispose(&self) {
        let taken = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.disposed.cancel();
        if taken.is_some() {
            debug!("pairing listener on port {} disposed", self.port);
        }
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Opens a [`SocketListener`] per call.
#[derive(Debug, Clone, Default)]
pub struct SocketListenerFactory {
    config: ListenerConfig,
}

impl SocketListenerFactory {
    pub fn new(config: ListenerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EndpointFactory for SocketListenerFactory {
    async fn open(&self) -> Result<Box<dyn PeerEndpoint>, ListenerError> {
        let listener = SocketListener::start(&self.config).await?;
        Ok(Box::new(listener))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
