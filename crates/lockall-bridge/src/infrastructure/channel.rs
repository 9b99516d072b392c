//! [`BridgeChannel`]: the [`Channel`] implementation over one extension
//! connection.
//!
//! The channel itself never touches the WebSocket.  It talks to the
//! connection's session task through two queues:
//!
//! ```text
//!   BridgeChannel ── outbound (text) ──▶ session writer ──▶ WebSocket
//!   BridgeChannel ◀── inbound (text) ─── session reader ◀── WebSocket
//! ```
//!
//! The session task owns the other ends ([`BridgeChannelIo`]).  When the
//! browser disconnects the session drops its inbound sender, which wakes any
//! waiting `receive` with [`ChannelError::Closed`].  The session feeds
//! `inbound` with `try_send` and drops frames when it is full, so unsolicited
//! traffic can never stall the reader.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lockall_core::{Channel, ChannelError, Command, CommandKind, Reply};

use crate::application::bridge_service::{
    command_to_text, message_type_name, reply_from_text, BridgeError,
};

/// Queue depth between the channel and its session task.
const QUEUE_DEPTH: usize = 16;

/// Session-side ends of a [`BridgeChannel`]'s queues.
pub struct BridgeChannelIo {
    /// Commands the session must write to the WebSocket.
    pub outbound: mpsc::Receiver<String>,
    /// Text frames the session read from the WebSocket.
    pub inbound: mpsc::Sender<String>,
    /// Cancelled when the channel is closed locally.
    pub closed: CancellationToken,
}

/// A long-lived channel to the browser extension.
pub struct BridgeChannel {
    peer: String,
    outbound: mpsc::Sender<String>,
    inbound: Mutex<mpsc::Receiver<String>>,
    exchange: Mutex<()>,
    closed: CancellationToken,
}

impl BridgeChannel {
    /// Creates a channel and the queue ends its session task drives.
    pub fn new(peer: impl Into<String>) -> (Self, BridgeChannelIo) {
        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
        let closed = CancellationToken::new();

        let channel = Self {
            peer: peer.into(),
            outbound: out_tx,
            inbound: Mutex::new(in_rx),
            exchange: Mutex::new(()),
            closed: closed.clone(),
        };
        let io = BridgeChannelIo {
            outbound: out_rx,
            inbound: in_tx,
            closed,
        };
        (channel, io)
    }

    /// `true` once the channel was closed locally.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Discards replies that arrived while no exchange was waiting, so they
    /// cannot be taken as the answer to the next command.
    async fn drain_stale(&self) {
        let mut inbound = self.inbound.lock().await;
        while let Ok(text) = inbound.try_recv() {
            warn!(
                peer = %self.peer,
                "discarding unsolicited {} frame from extension",
                message_type_name(&text)
            );
        }
    }
}

#[async_trait]
impl Channel for BridgeChannel {
    async fn send(&self, command: &Command) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let text = command_to_text(command).map_err(BridgeError::into_channel_error)?;
        debug!(peer = %self.peer, "host → extension: {}", command.kind());
        self.outbound
            .send(text)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    async fn receive(&self, expected: CommandKind) -> Result<Reply, ChannelError> {
        let mut inbound = self.inbound.lock().await;
        let text = tokio::select! {
            _ = self.closed.cancelled() => return Err(ChannelError::Closed),
            next = inbound.recv() => next.ok_or(ChannelError::Closed)?,
        };
        debug!(peer = %self.peer, "extension → host: {}", message_type_name(&text));
        reply_from_text(expected, &text).map_err(BridgeError::into_channel_error)
    }

    async fn request(&self, command: &Command, deadline: Duration) -> Result<Reply, ChannelError> {
        let _exchange = self.exchange.try_lock().map_err(|_| ChannelError::Busy)?;
        self.drain_stale().await;

        tokio::time::timeout(deadline, async {
            self.send(command).await?;
            self.receive(command.kind()).await
        })
        .await
        .map_err(|_| ChannelError::TimedOut(deadline))?
    }

    async fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(peer = %self.peer, "closing bridge channel");
            self.closed.cancel();
        }
    }

    fn describe(&self) -> String {
        format!("bridge {}", self.peer)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
