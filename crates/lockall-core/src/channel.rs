//! The transport-agnostic command channel.
//!
//! A channel carries exactly one outstanding command at a time: the host
//! sends a [`Command`], then awaits the single [`Reply`] that answers it.
//! There are no sequence identifiers on the wire, so correlation is simply
//! "the next message on this channel".
//!
//! # Implementations
//!
//! - The agent's socket channel wraps one accepted TCP connection and is
//!   one-shot: it closes itself after its first completed exchange.
//! - The bridge's channel wraps a long-lived WebSocket connection to the
//!   browser extension and is reused across many exchanges.
//!
//! # Concurrency (for beginners)
//!
//! `request` holds an exclusive *exchange guard* for the duration of one
//! send + receive.  A second `request` that arrives while the guard is held
//! fails immediately with [`ChannelError::Busy`] instead of queueing, because
//! a queued command could otherwise receive the reply meant for the first.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::command::{Command, CommandKind, PayloadError, Reply};
use crate::protocol::frame::FrameError;

/// Errors a channel can report.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer disconnected, or the channel was closed locally.
    #[error("channel is closed")]
    Closed,

    /// Another exchange is already in flight on this channel.
    #[error("channel is busy with another exchange")]
    Busy,

    /// The reply did not match the command's tag or reply shape.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// No reply arrived before the deadline.
    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    /// The surrounding operation was cancelled.
    #[error("exchange was cancelled")]
    Cancelled,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream could not be framed.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A command could not be serialized.
    #[error("could not encode command: {0}")]
    Encode(#[source] PayloadError),
}

impl ChannelError {
    /// Maps a reply decoding failure to [`ChannelError::MalformedReply`].
    pub fn malformed(err: impl std::fmt::Display) -> Self {
        ChannelError::MalformedReply(err.to_string())
    }

    /// `true` when the channel can no longer be used.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::Closed | ChannelError::Io(_) | ChannelError::Frame(_)
        )
    }
}

/// Abstraction over one peer connection that answers typed commands.
///
/// Implementations must be `Send + Sync` so a channel can be shared through
/// `Arc<dyn Channel>` between the bridge registry and dispatch tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Writes one command to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the peer is gone.
    async fn send(&self, command: &Command) -> Result<(), ChannelError>;

    /// Waits for the next reply and checks it answers `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the peer disconnects first and
    /// [`ChannelError::MalformedReply`] if the reply does not fit `expected`.
    async fn receive(&self, expected: CommandKind) -> Result<Reply, ChannelError>;

    /// Sends `command` and waits up to `deadline` for its reply, holding the
    /// exchange guard throughout.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Busy`] if an exchange is already in flight,
    /// [`ChannelError::TimedOut`] when the deadline elapses, plus any error
    /// from [`Channel::send`] or [`Channel::receive`].
    async fn request(&self, command: &Command, deadline: Duration) -> Result<Reply, ChannelError>;

    /// Closes the channel.  Outstanding and later exchanges fail with
    /// [`ChannelError::Closed`].  Calling it twice is harmless.
    async fn close(&self);

    /// Short description of the peer for log lines.
    fn describe(&self) -> String;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
