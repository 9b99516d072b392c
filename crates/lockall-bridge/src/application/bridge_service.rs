//! Envelope translation logic.
//!
//! Pure functions that translate between the typed vocabulary in
//! `lockall-core` and the JSON text frames the browser extension speaks:
//!
//! ```text
//! Host → Extension:  Command  → JSON text   call: command_to_text()
//! Extension → Host:  JSON text → Reply      call: reply_from_text()
//! ```
//!
//! Nothing here touches sockets or async runtimes, so every rule can be unit
//! tested in isolation.

use thiserror::Error;

use lockall_core::{ChannelError, Command, CommandKind, PayloadError, Reply};

use crate::domain::messages::Envelope;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur during envelope translation.
///
/// These describe malformed traffic from the extension, not I/O failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The text frame is not a `{"type","payload"}` object.
    #[error("invalid JSON envelope: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The extension answered with a different tag than the command sent.
    #[error("expected a {expected} reply, got {actual:?}")]
    UnexpectedType { expected: CommandKind, actual: String },

    /// The payload does not match the reply shape for its tag.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// A command could not be serialized.
    #[error("could not encode {kind} command: {source}")]
    Encode {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeError {
    /// Maps a translation failure onto the [`ChannelError`] taxonomy.
    ///
    /// Encoding failures keep their serde cause as [`ChannelError::Encode`];
    /// everything else is bad traffic from the extension.
    pub fn into_channel_error(self) -> ChannelError {
        match self {
            BridgeError::Encode { kind, source } => {
                ChannelError::Encode(PayloadError::Json { kind, source })
            }
            other => ChannelError::malformed(other),
        }
    }
}

// ── Host → Extension ──────────────────────────────────────────────────────────

/// Serializes a command into one JSON text frame.
///
/// # Errors
///
/// Returns [`BridgeError::Encode`] if serialization fails.
///
/// # Example
///
/// ```rust
/// use lockall_bridge::application::command_to_text;
/// use lockall_core::{Command, ResourceRequest};
///
/// let text = command_to_text(&Command::Otp(ResourceRequest::default())).unwrap();
/// assert_eq!(text, r#"{"type":"OTP","payload":{"resourceId":""}}"#);
/// ```
pub fn command_to_text(command: &Command) -> Result<String, BridgeError> {
    serde_json::to_string(command).map_err(|source| BridgeError::Encode {
        kind: command.kind(),
        source,
    })
}

// ── Extension → Host ──────────────────────────────────────────────────────────

/// Parses a text frame as the reply to an `expected` command.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidJson`] for a frame that is not an envelope,
/// [`BridgeError::UnexpectedType`] when the tag differs from `expected`, and
/// [`BridgeError::Payload`] when the payload has the wrong shape.
pub fn reply_from_text(expected: CommandKind, text: &str) -> Result<Reply, BridgeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(BridgeError::InvalidJson)?;

    if envelope.kind != expected.as_str() {
        return Err(BridgeError::UnexpectedType {
            expected,
            actual: envelope.kind,
        });
    }

    // Re-serializing a `Value` cannot fail; route it through the same typed
    // decoder the socket transport uses.
    let payload = serde_json::to_vec(&envelope.payload).map_err(BridgeError::InvalidJson)?;
    Ok(Reply::decode(expected, &envelope.kind, &payload)?)
}

/// Returns the `type` of a text frame for log lines, never its payload.
pub fn message_type_name(text: &str) -> String {
    serde_json::from_str::<Envelope>(text)
        .map(|env| env.kind)
        .unwrap_or_else(|_| "<not an envelope>".to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
