//! Framing for commands and replies on a byte stream.
//!
//! Wire format (version 1):
//! ```text
//! [version:1][tag_len:1][tag:N][payload_len:4][payload:M]
//! ```
//! `tag` is the ASCII command tag, `payload` a UTF-8 JSON document.
//! `payload_len` is big-endian and capped at [`MAX_PAYLOAD_LEN`].

use thiserror::Error;

use crate::protocol::command::{Command, PayloadError, Reply};

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Fixed bytes around the tag: version + tag_len + payload_len.
pub const FRAME_OVERHEAD: usize = 1 + 1 + 4;

/// Largest payload a peer may send.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer does not yet hold a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The version byte is not supported.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// The tag is empty, too long, or not printable ASCII.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// The payload exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload of {declared} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { declared: usize, max: usize },
}

/// One decoded `(tag, payload)` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds the frame for a command.
    pub fn from_command(command: &Command) -> Result<Self, PayloadError> {
        Ok(Self {
            tag: command.kind().as_str().to_string(),
            payload: command.encode_payload()?,
        })
    }

    /// Builds the frame for a reply.
    pub fn from_reply(reply: &Reply) -> Result<Self, PayloadError> {
        Ok(Self {
            tag: reply.kind().as_str().to_string(),
            payload: reply.encode_payload()?,
        })
    }

    /// Encodes this frame; see [`encode_frame`].
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(&self.tag, &self.payload)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a `(tag, payload)` pair into one frame.
///
/// # Errors
///
/// Returns [`FrameError::InvalidTag`] for an unusable tag and
/// [`FrameError::PayloadTooLarge`] for an oversized payload.
///
/// # Examples
///
/// ```rust
/// use lockall_core::{decode_frame, encode_frame};
///
/// let bytes = encode_frame("OTP", b"{}").unwrap();
/// let (frame, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(frame.tag, "OTP");
/// assert_eq!(frame.payload, b"{}");
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(tag: &str, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    validate_tag(tag.as_bytes())?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            declared: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + tag.len() + payload.len());
    buf.push(FRAME_VERSION);
    buf.push(tag.len() as u8);
    buf.extend_from_slice(tag.as_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes consumed so a streaming reader
/// can advance its buffer.  [`FrameError::InsufficientData`] means "read
/// more"; every other error means the stream is corrupt.
///
/// # Errors
///
/// Returns [`FrameError`] if the bytes are incomplete or malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::InsufficientData {
            needed: 2,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != FRAME_VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }

    let tag_len = bytes[1] as usize;
    let len_off = 2 + tag_len;
    let payload_off = len_off + 4;
    if bytes.len() < payload_off {
        return Err(FrameError::InsufficientData {
            needed: payload_off,
            available: bytes.len(),
        });
    }

    let tag_bytes = &bytes[2..len_off];
    validate_tag(tag_bytes)?;

    let payload_len = u32::from_be_bytes([
        bytes[len_off],
        bytes[len_off + 1],
        bytes[len_off + 2],
        bytes[len_off + 3],
    ]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            declared: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let total = payload_off + payload_len;
    if bytes.len() < total {
        return Err(FrameError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    // validate_tag guarantees ASCII, so this conversion is lossless.
    let tag = String::from_utf8_lossy(tag_bytes).into_owned();
    let payload = bytes[payload_off..total].to_vec();
    Ok((Frame { tag, payload }, total))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn validate_tag(tag: &[u8]) -> Result<(), FrameError> {
    if tag.is_empty() || tag.len() > u8::MAX as usize {
        return Err(FrameError::InvalidTag(format!("length {}", tag.len())));
    }
    if !tag.iter().all(|b| b.is_ascii_graphic()) {
        return Err(FrameError::InvalidTag(
            String::from_utf8_lossy(tag).into_owned(),
        ));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{CommandKind, StoreRequest};

    #[test]
    fn test_layout_of_small_frame() {
        let bytes = encode_frame("OTP", b"{}").unwrap();
        assert_eq!(
            bytes,
            vec![FRAME_VERSION, 3, b'O', b'T', b'P', 0, 0, 0, 2, b'{', b'}']
        );
    }

    #[test]
    fn test_decode_reports_consumed_bytes_with_trailing_data() {
        let mut bytes = encode_frame("PULL", br#"{"resourceId":"x"}"#).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode_frame("OTP", b"{}").unwrap());

        let (frame, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!(frame.tag, "PULL");
        assert_eq!(consumed, first_len);

        let (second, _) = decode_frame(&bytes[consumed..]).unwrap();
        assert_eq!(second.tag, "OTP");
    }

    #[test]
    fn test_every_prefix_of_a_frame_is_insufficient_data() {
        let bytes = encode_frame("STORE", br#"{"status":"ok"}"#).unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(
                    decode_frame(&bytes[..cut]),
                    Err(FrameError::InsufficientData { .. })
                ),
                "prefix of length {cut} must ask for more data"
            );
        }
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut bytes = encode_frame("OTP", b"{}").unwrap();
        bytes[0] = 0x09;
        assert_eq!(decode_frame(&bytes), Err(FrameError::UnsupportedVersion(0x09)));
    }

    #[test]
    fn test_empty_tag_is_rejected() {
        assert!(matches!(
            encode_frame("", b"{}"),
            Err(FrameError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_tag_with_whitespace_is_rejected() {
        assert!(matches!(
            encode_frame("O P", b"{}"),
            Err(FrameError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_oversized_payload_is_rejected_on_encode() {
        let payload = vec![b' '; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_frame("PULL", &payload),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_declared_length_is_rejected_before_buffering() {
        let mut bytes = vec![FRAME_VERSION, 3, b'O', b'T', b'P'];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_from_command_carries_tag_and_payload() {
        let cmd = Command::Store(StoreRequest {
            resource_id: "example.com".to_string(),
            credential: "p@ss".to_string(),
        });
        let frame = Frame::from_command(&cmd).unwrap();
        assert_eq!(frame.tag, CommandKind::Store.as_str());
        assert_eq!(Command::decode(&frame.tag, &frame.payload).unwrap(), cmd);
    }
}
