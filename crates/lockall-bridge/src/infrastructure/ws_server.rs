//! WebSocket server: accept loop and per-connection session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the loopback bridge address.
//! 2. Upgrading connections whose request path matches the configured path
//!    (every other path is answered with HTTP 404 during the handshake).
//! 3. Wrapping each upgraded connection in a [`BridgeChannel`] and installing
//!    it in the [`BridgeRegistry`].  The newest connection wins; the one it
//!    replaces is closed.
//! 4. Running two concurrent tasks per connection:
//!    - **Writer**: takes command text from the channel and writes it to the
//!      WebSocket.
//!    - **Reader**: reads reply text from the WebSocket and hands it to the
//!      channel.
//! 5. Clearing the registry entry when the connection ends.
//!
//! Shutdown is driven by a `CancellationToken` owned by the caller.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Error as WsError, Message as WsMessage,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lockall_core::Channel;

use crate::application::bridge_service::message_type_name;
use crate::application::registry::{BridgeEntry, BridgeRegistry};
use crate::domain::config::BridgeConfig;
use crate::infrastructure::channel::{BridgeChannel, BridgeChannelIo};

/// Errors from setting up the bridge server.
#[derive(Debug, Error)]
pub enum BridgeServerError {
    /// The loopback port could not be bound, typically because another
    /// instance already owns it.
    #[error("failed to bind bridge listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A bound, not yet running, bridge server.
pub struct BridgeServer {
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    registry: Arc<BridgeRegistry>,
}

// ── Public API ────────────────────────────────────────────────────────────────

impl BridgeServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeServerError::BindFailed`] if the address is in use or
    /// cannot be bound.  Callers treat this as non-fatal and continue without
    /// browser support.
    pub async fn bind(
        config: BridgeConfig,
        registry: Arc<BridgeRegistry>,
    ) -> Result<Self, BridgeServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| BridgeServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            registry,
        })
    }

    /// The address actually bound (useful when the configured port is `0`).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket address cannot be queried.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `cancel` fires.
    ///
    /// Each accepted connection is handed to its own task so a slow
    /// handshake never blocks the loop.  Cancelling also closes every live
    /// connection this server opened.
    pub async fn run(self, cancel: CancellationToken) {
        match self.listener.local_addr() {
            Ok(addr) => info!("bridge listening on ws://{addr}{}", self.config.path),
            Err(e) => warn!("bridge listening (address unavailable: {e})"),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested; stopping bridge accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("bridge connection from {peer_addr}");
                        let config = Arc::clone(&self.config);
                        let registry = Arc::clone(&self.registry);
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, config, registry, cancel).await;
                        });
                    }
                    Err(e) => {
                        // Transient (e.g. too many open files); keep serving.
                        error!("bridge accept error: {e}");
                    }
                },
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    registry: Arc<BridgeRegistry>,
    cancel: CancellationToken,
) {
    match run_session(stream, peer_addr, config, registry, cancel).await {
        Ok(()) => info!("bridge session {peer_addr} closed"),
        Err(e) => warn!("bridge session {peer_addr} ended with error: {e:#}"),
    }
}

/// Runs one extension connection from handshake to disconnect.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    registry: Arc<BridgeRegistry>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    // ── Step 1: Handshake, restricted to the configured path ─────────────────
    let expected_path = config.path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == expected_path {
            Ok(response)
        } else {
            Err(not_found(request.uri().path()))
        }
    };
    let ws_stream = accept_hdr_async(stream, check_path)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // ── Step 2: Register the channel ─────────────────────────────────────────
    let (channel, io) = BridgeChannel::new(peer_addr.to_string());
    let channel: Arc<dyn Channel> = Arc::new(channel);
    let entry = BridgeEntry::new(config.scope_suffix.clone(), Arc::clone(&channel));
    let entry_id = entry.id;
    if let Some(previous) = registry.set_active(entry) {
        info!("bridge {peer_addr} replaces {}", previous.channel.describe());
        previous.channel.close().await;
    }

    // ── Step 3: Pump frames until either side goes away ──────────────────────
    let BridgeChannelIo {
        mut outbound,
        inbound,
        closed,
    } = io;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let writer = async {
        loop {
            tokio::select! {
                _ = closed.cancelled() => break,
                _ = cancel.cancelled() => break,
                next = outbound.recv() => match next {
                    Some(text) => {
                        if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                            debug!("bridge {peer_addr}: send failed: {e}");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        // Best effort: the peer may already be gone.
        let _ = ws_tx.close().await;
    };

    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                // Never wait on the queue, or a flood would hide the close frame.
                Ok(WsMessage::Text(text)) => match inbound.try_send(text) {
                    Ok(()) => {}
                    Err(TrySendError::Full(text)) => {
                        warn!(
                            "bridge {peer_addr}: inbound queue full; dropping {} frame",
                            message_type_name(&text)
                        );
                    }
                    Err(TrySendError::Closed(_)) => break,
                },
                Ok(WsMessage::Binary(_)) => {
                    warn!("bridge {peer_addr}: unexpected binary frame (ignored)");
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                Ok(WsMessage::Close(_)) => {
                    debug!("bridge {peer_addr}: close frame received");
                    break;
                }
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
                Err(e) => {
                    warn!("bridge {peer_addr}: read error: {e}");
                    break;
                }
            }
        }
    };

    // Whichever side finishes first ends the session.
    tokio::select! {
        _ = writer => debug!("bridge {peer_addr}: writer finished"),
        _ = reader => debug!("bridge {peer_addr}: reader finished"),
    }

    // ── Step 4: Tear down ────────────────────────────────────────────────────
    channel.close().await;
    registry.clear(entry_id);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn not_found(path: &str) -> ErrorResponse {
    debug!("rejecting bridge handshake for path {path:?}");
    let mut response = ErrorResponse::new(Some(format!("no bridge at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_response_has_404_status() {
        let response = not_found("/other");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_deref(), Some("no bridge at /other"));
    }

    #[tokio::test]
    async fn test_bind_on_ephemeral_port_reports_local_addr() {
        let server = BridgeServer::bind(BridgeConfig::on_port(0), Arc::new(BridgeRegistry::new()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_fails() {
        // Arrange
        let first = BridgeServer::bind(BridgeConfig::on_port(0), Arc::new(BridgeRegistry::new()))
            .await
            .unwrap();
        let taken = first.local_addr().unwrap().port();

        // Act
        let second =
            BridgeServer::bind(BridgeConfig::on_port(taken), Arc::new(BridgeRegistry::new())).await;

        // Assert
        assert!(matches!(second, Err(BridgeServerError::BindFailed { .. })));
    }
}
