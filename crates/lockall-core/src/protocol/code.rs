//! Out-of-band code payload: what the scannable code carries.
//!
//! A companion scanner reconstructs `(command kind, header)` from the code,
//! connects back to the advertised endpoint, and answers the command that
//! arrives there.
//!
//! Binary layout before text encoding:
//! ```text
//! [code_version:1][tag_len:1][tag:N][header bytes]
//! ```
//! Text form: `lockall:` followed by standard base64 of those bytes.

use base64::Engine;
use thiserror::Error;

use crate::protocol::command::{CommandKind, PayloadError};
use crate::protocol::header::{Header, HeaderError};

/// Current code payload version.
pub const CODE_VERSION: u8 = 0x01;

/// URI-style prefix that marks the text form.
pub const CODE_PREFIX: &str = "lockall:";

/// Errors that can occur while parsing a scanned code.
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("code does not start with {CODE_PREFIX:?}")]
    MissingPrefix,

    #[error("invalid base64 in code: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("code is truncated")]
    Truncated,

    #[error("unsupported code version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid command tag in code: {0}")]
    Tag(#[from] PayloadError),

    #[error("invalid header in code: {0}")]
    Header(#[from] HeaderError),
}

/// The tuple shown to the user as a scannable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OobCode {
    pub kind: CommandKind,
    pub header: Header,
}

impl OobCode {
    pub fn new(kind: CommandKind, header: Header) -> Self {
        Self { kind, header }
    }

    /// Binary form, before text encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let tag = self.kind.as_str().as_bytes();
        let mut buf = Vec::with_capacity(2 + tag.len() + self.header.encoded_len());
        buf.push(CODE_VERSION);
        buf.push(tag.len() as u8);
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&self.header.encode());
        buf
    }

    /// Text form handed to the code renderer.
    pub fn to_text(&self) -> String {
        format!(
            "{CODE_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
        )
    }

    /// Parses the binary form.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] for truncated input, an unknown version or tag,
    /// or an invalid header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodeError> {
        if bytes.len() < 2 {
            return Err(CodeError::Truncated);
        }
        if bytes[0] != CODE_VERSION {
            return Err(CodeError::UnsupportedVersion(bytes[0]));
        }
        let tag_end = 2 + bytes[1] as usize;
        let tag = bytes.get(2..tag_end).ok_or(CodeError::Truncated)?;
        let kind = CommandKind::from_tag(&String::from_utf8_lossy(tag))?;
        let header = Header::decode(&bytes[tag_end..])?;
        Ok(Self { kind, header })
    }

    /// Parses the text form produced by [`OobCode::to_text`].
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] if the prefix, base64, or binary layout is invalid.
    pub fn from_text(text: &str) -> Result<Self, CodeError> {
        let encoded = text
            .trim()
            .strip_prefix(CODE_PREFIX)
            .ok_or(CodeError::MissingPrefix)?;
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn socket_code() -> OobCode {
        OobCode::new(
            CommandKind::Pairing,
            Header::Socket {
                address: Ipv4Addr::new(192, 168, 0, 12),
                port: 40123,
            },
        )
    }

    #[test]
    fn test_text_form_has_prefix_and_parses_back() {
        let code = socket_code();
        let text = code.to_text();
        assert!(text.starts_with(CODE_PREFIX));
        assert_eq!(OobCode::from_text(&text).unwrap(), code);
    }

    #[test]
    fn test_bytes_embed_tag_then_header() {
        let bytes = socket_code().to_bytes();
        assert_eq!(bytes[0], CODE_VERSION);
        assert_eq!(bytes[1] as usize, "PAIRING".len());
        assert_eq!(&bytes[2..9], b"PAIRING");
        assert_eq!(bytes[9], crate::protocol::header::TAG_SOCKET);
        assert_eq!(bytes.len(), 2 + 7 + 9);
    }

    #[test]
    fn test_bridge_code_parses_back() {
        let code = OobCode::new(CommandKind::Otp, Header::Bridge);
        assert_eq!(OobCode::from_text(&code.to_text()).unwrap(), code);
    }

    #[test]
    fn test_missing_prefix_is_rejected() {
        assert!(matches!(
            OobCode::from_text("AQdQQUlSSU5H"),
            Err(CodeError::MissingPrefix)
        ));
    }

    #[test]
    fn test_truncated_tag_is_rejected() {
        assert!(matches!(
            OobCode::from_bytes(&[CODE_VERSION, 7, b'P']),
            Err(CodeError::Truncated)
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut bytes = socket_code().to_bytes();
        bytes[0] = 0x42;
        assert!(matches!(
            OobCode::from_bytes(&bytes),
            Err(CodeError::UnsupportedVersion(0x42))
        ));
    }
}
