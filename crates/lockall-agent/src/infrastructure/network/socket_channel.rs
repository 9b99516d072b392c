//! One-shot command channel over an accepted TCP connection.
//!
//! A companion device connects once, receives exactly one framed command,
//! writes exactly one framed reply, and the connection is done.  After its
//! first completed exchange a [`SocketChannel`] closes itself; later requests
//! fail with [`ChannelError::Closed`].
//!
//! # Stream reading (for beginners)
//!
//! TCP is a stream protocol: one `read()` may return part of a frame, or
//! parts of two.  [`FrameReader`] accumulates bytes and calls
//! [`decode_frame`] until it stops answering `InsufficientData`.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lockall_core::{
    decode_frame, Channel, ChannelError, Command, CommandKind, Frame, FrameError, Reply,
};

const READ_CHUNK: usize = 4096;

// ── Frame reader ──────────────────────────────────────────────────────────────

/// Accumulates bytes from a read half and yields whole frames.
pub(crate) struct FrameReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
    tmp: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn new(half: OwnedReadHalf) -> Self {
        Self {
            half,
            buf: Vec::with_capacity(READ_CHUNK),
            tmp: vec![0u8; READ_CHUNK],
        }
    }

    /// Reads until one complete frame is buffered.
    ///
    /// EOF before a complete frame is [`ChannelError::Closed`].
    pub(crate) async fn next_frame(&mut self) -> Result<Frame, ChannelError> {
        loop {
            match decode_frame(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(frame);
                }
                Err(FrameError::InsufficientData { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let n = self.half.read(&mut self.tmp).await.map_err(closed_or_io)?;
            if n == 0 {
                return Err(ChannelError::Closed);
            }
            self.buf.extend_from_slice(&self.tmp[..n]);
        }
    }
}

/// Writes one frame.
pub(crate) async fn write_frame(
    half: &mut OwnedWriteHalf,
    frame: &Frame,
) -> Result<(), ChannelError> {
    let bytes = frame.encode()?;
    half.write_all(&bytes).await.map_err(closed_or_io)?;
    half.flush().await.map_err(closed_or_io)
}

/// A reset or broken pipe means the peer is gone, not that I/O is broken.
fn closed_or_io(e: std::io::Error) -> ChannelError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => ChannelError::Closed,
        _ => ChannelError::Io(e),
    }
}

// ── Socket channel ────────────────────────────────────────────────────────────

/// A [`Channel`] over one accepted TCP connection.
pub struct SocketChannel {
    peer: SocketAddr,
    reader: Mutex<FrameReader>,
    writer: Mutex<OwnedWriteHalf>,
    exchange: Mutex<()>,
    closed: CancellationToken,
}

impl SocketChannel {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            peer,
            reader: Mutex::new(FrameReader::new(read_half)),
            writer: Mutex::new(write_half),
            exchange: Mutex::new(()),
            closed: CancellationToken::new(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Channel for SocketChannel {
    async fn send(&self, command: &Command) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let frame = Frame::from_command(command).map_err(ChannelError::Encode)?;
        debug!(peer = %self.peer, "host → companion: {}", command.kind());
        let mut writer = self.writer.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            written = write_frame(&mut writer, &frame) => written,
        }
    }

    async fn receive(&self, expected: CommandKind) -> Result<Reply, ChannelError> {
        let mut reader = self.reader.lock().await;
        let frame = tokio::select! {
            _ = self.closed.cancelled() => return Err(ChannelError::Closed),
            frame = reader.next_frame() => frame?,
        };
        debug!(peer = %self.peer, "companion → host: {}", frame.tag);
        Reply::decode(expected, &frame.tag, &frame.payload).map_err(ChannelError::malformed)
    }

    async fn request(&self, command: &Command, deadline: Duration) -> Result<Reply, ChannelError> {
        let _exchange = self.exchange.try_lock().map_err(|_| ChannelError::Busy)?;
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }

        let result = tokio::time::timeout(deadline, async {
            self.send(command).await?;
            self.receive(command.kind()).await
        })
        .await
        .map_err(|_| ChannelError::TimedOut(deadline))
        .and_then(|inner| inner);

        // One exchange per connection.
        self.close().await;
        result
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        // Best effort: the peer may already have hung up.
        let _ = writer.shutdown().await;
        debug!(peer = %self.peer, "socket channel closed");
    }

    fn describe(&self) -> String {
        format!("socket {}", self.peer)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
