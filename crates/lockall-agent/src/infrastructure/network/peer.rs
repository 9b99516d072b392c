//! Companion (scanner) side of the socket transport.
//!
//! A phone app scans the rendered code, dials the header's address, reads
//! one command and writes one reply.  [`PeerConnection`] implements that
//! side so the host can be exercised end to end without a phone, and so a
//! desktop companion can be built on the same codec.

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use lockall_core::{ChannelError, CodeError, Command, Frame, Header, OobCode, PayloadError, Reply};

use super::socket_channel::{write_frame, FrameReader};

/// Errors on the companion side.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("invalid pairing code: {0}")]
    Code(#[from] CodeError),

    /// Bridge headers describe the browser transport, which cannot be dialed.
    #[error("code does not describe a socket endpoint")]
    NotConnectable,

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("undecodable command: {0}")]
    Payload(#[from] PayloadError),

    /// The command this connection carries was already read.
    #[error("the command for this connection was already read")]
    AlreadyRead,
}

/// One companion connection to a host listener.
pub struct PeerConnection {
    expected: OobCode,
    reader: FrameReader,
    writer: tokio::net::tcp::OwnedWriteHalf,
    command_read: bool,
}

impl PeerConnection {
    /// Dials the endpoint described by `code`.
    ///
    /// # Errors
    ///
    /// [`PeerError::NotConnectable`] for bridge headers,
    /// [`PeerError::Connect`] when the host cannot be reached.
    pub async fn connect(code: &OobCode) -> Result<Self, PeerError> {
        let Header::Socket { address, port } = code.header else {
            return Err(PeerError::NotConnectable);
        };
        let stream = TcpStream::connect((address, port))
            .await
            .map_err(PeerError::Connect)?;
        debug!("companion connected to {address}:{port} for {}", code.kind);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            expected: *code,
            reader: FrameReader::new(read_half),
            writer: write_half,
            command_read: false,
        })
    }

    /// Parses the scanned text and dials it.
    ///
    /// # Errors
    ///
    /// [`PeerError::Code`] if the text is not a valid code, otherwise as
    /// [`PeerConnection::connect`].
    pub async fn connect_text(text: &str) -> Result<Self, PeerError> {
        let code = OobCode::from_text(text)?;
        Self::connect(&code).await
    }

    /// The code this connection was opened from.
    pub fn code(&self) -> &OobCode {
        &self.expected
    }

    /// Reads the one command the host sends.
    ///
    /// # Errors
    ///
    /// [`PeerError::AlreadyRead`] on a second call, otherwise framing and
    /// payload errors.
    pub async fn next_command(&mut self) -> Result<Command, PeerError> {
        if self.command_read {
            return Err(PeerError::AlreadyRead);
        }
        let frame = self.reader.next_frame().await?;
        self.command_read = true;
        Ok(Command::decode(&frame.tag, &frame.payload)?)
    }

    /// Writes the reply and consumes the connection.
    ///
    /// # Errors
    ///
    /// Returns framing or I/O errors from the write.
    pub async fn reply(mut self, reply: &Reply) -> Result<(), PeerError> {
        let frame = Frame::from_reply(reply)?;
        write_frame(&mut self.writer, &frame).await?;
        Ok(())
    }
}
