//! The fixed command vocabulary and the reply shape for each command.
//!
//! Every message on a channel is logically `(tag, payload)`: a short ASCII
//! tag naming the command and a JSON document whose schema is fixed per tag.
//!
//! | Tag       | Command payload              | Reply payload  |
//! |-----------|------------------------------|----------------|
//! | `PAIRING` | `{"name"}`                   | `{"name"}`     |
//! | `OTP`     | `{"resourceId"}`             | `{"password"}` |
//! | `PULL`    | `{"resourceId"}`             | `{"password"}` |
//! | `STORE`   | `{"resourceId","credential"}`| `{"status"}`   |
//!
//! A reply always carries the tag of the command that provoked it.
//!
//! The serde representation is adjacently tagged so the same enums double as
//! the bridge's JSON envelope:
//!
//! ```json
//! {"type":"STORE","payload":{"resourceId":"example.com","credential":"p@ss"}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while mapping `(tag, payload)` pairs to typed values.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The tag is not part of the vocabulary.
    #[error("unknown command tag: {0:?}")]
    UnknownTag(String),

    /// A reply arrived carrying a different tag than the command sent.
    #[error("expected a {expected} reply, got tag {actual:?}")]
    UnexpectedTag { expected: CommandKind, actual: String },

    /// The JSON document does not match the schema for its tag.
    #[error("invalid {kind} payload: {source}")]
    Json {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },
}

// ── Command kinds ─────────────────────────────────────────────────────────────

/// The four command tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "PAIRING")]
    Pairing,
    #[serde(rename = "OTP")]
    Otp,
    #[serde(rename = "PULL")]
    Pull,
    #[serde(rename = "STORE")]
    Store,
}

impl CommandKind {
    /// All kinds, in wire-tag order.
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Pairing,
        CommandKind::Otp,
        CommandKind::Pull,
        CommandKind::Store,
    ];

    /// The ASCII tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Pairing => "PAIRING",
            CommandKind::Otp => "OTP",
            CommandKind::Pull => "PULL",
            CommandKind::Store => "STORE",
        }
    }

    /// Parses a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::UnknownTag`] for anything outside the vocabulary.
    pub fn from_tag(tag: &str) -> Result<Self, PayloadError> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| PayloadError::UnknownTag(tag.to_string()))
    }

    /// Whether this command may use the bridge fast path.
    ///
    /// Pairing always goes through a scanned code so the companion device can
    /// learn how to reach this host.
    pub fn fast_path_eligible(&self) -> bool {
        !matches!(self, CommandKind::Pairing)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payload documents ─────────────────────────────────────────────────────────

/// Identity exchanged during pairing (both directions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMessage {
    pub name: String,
}

/// Names the resource a credential belongs to.
///
/// `resourceId` may be empty or absent; the peer then picks the resource
/// itself (for example the browser's active tab).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    #[serde(default)]
    pub resource_id: String,
}

/// Asks the peer to store a new credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    #[serde(default)]
    pub resource_id: String,
    pub credential: String,
}

impl fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRequest")
            .field("resource_id", &self.resource_id)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// A secret returned by the peer (one-time password or stored credential).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReply {
    pub password: String,
}

impl fmt::Debug for PasswordReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordReply")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of a store request as reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    /// `true` when the peer reported `"ok"` (case-insensitive).
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

// ── Command ───────────────────────────────────────────────────────────────────

/// A request sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    #[serde(rename = "PAIRING")]
    Pairing(NameMessage),
    #[serde(rename = "OTP")]
    Otp(ResourceRequest),
    #[serde(rename = "PULL")]
    Pull(ResourceRequest),
    #[serde(rename = "STORE")]
    Store(StoreRequest),
}

impl Command {
    /// Returns the tag of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Pairing(_) => CommandKind::Pairing,
            Command::Otp(_) => CommandKind::Otp,
            Command::Pull(_) => CommandKind::Pull,
            Command::Store(_) => CommandKind::Store,
        }
    }

    /// Serializes only the payload document.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] if serialization fails.
    pub fn encode_payload(&self) -> Result<Vec<u8>, PayloadError> {
        let kind = self.kind();
        let result = match self {
            Command::Pairing(m) => serde_json::to_vec(m),
            Command::Otp(m) | Command::Pull(m) => serde_json::to_vec(m),
            Command::Store(m) => serde_json::to_vec(m),
        };
        result.map_err(|source| PayloadError::Json { kind, source })
    }

    /// Rebuilds a command from its wire tag and payload document.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] for an unknown tag or a payload that does not
    /// match the tag's schema.
    pub fn decode(tag: &str, payload: &[u8]) -> Result<Self, PayloadError> {
        let kind = CommandKind::from_tag(tag)?;
        let json_err = |source| PayloadError::Json { kind, source };
        match kind {
            CommandKind::Pairing => serde_json::from_slice(payload)
                .map(Command::Pairing)
                .map_err(json_err),
            CommandKind::Otp => serde_json::from_slice(payload)
                .map(Command::Otp)
                .map_err(json_err),
            CommandKind::Pull => serde_json::from_slice(payload)
                .map(Command::Pull)
                .map_err(json_err),
            CommandKind::Store => serde_json::from_slice(payload)
                .map(Command::Store)
                .map_err(json_err),
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// The answer to a [`Command`]; its shape is determined by the command's tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Reply {
    #[serde(rename = "PAIRING")]
    Pairing(NameMessage),
    #[serde(rename = "OTP")]
    Otp(PasswordReply),
    #[serde(rename = "PULL")]
    Pull(PasswordReply),
    #[serde(rename = "STORE")]
    Store(StatusReply),
}

impl Reply {
    /// Returns the tag this reply answers.
    pub fn kind(&self) -> CommandKind {
        match self {
            Reply::Pairing(_) => CommandKind::Pairing,
            Reply::Otp(_) => CommandKind::Otp,
            Reply::Pull(_) => CommandKind::Pull,
            Reply::Store(_) => CommandKind::Store,
        }
    }

    /// Serializes only the payload document.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] if serialization fails.
    pub fn encode_payload(&self) -> Result<Vec<u8>, PayloadError> {
        let kind = self.kind();
        let result = match self {
            Reply::Pairing(m) => serde_json::to_vec(m),
            Reply::Otp(m) | Reply::Pull(m) => serde_json::to_vec(m),
            Reply::Store(m) => serde_json::to_vec(m),
        };
        result.map_err(|source| PayloadError::Json { kind, source })
    }

    /// Decodes a reply, checking it answers the `expected` command.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::UnexpectedTag`] when `tag` differs from
    /// `expected`, or [`PayloadError::Json`] when the payload does not match.
    pub fn decode(expected: CommandKind, tag: &str, payload: &[u8]) -> Result<Self, PayloadError> {
        if tag != expected.as_str() {
            return Err(PayloadError::UnexpectedTag {
                expected,
                actual: tag.to_string(),
            });
        }
        let json_err = |source| PayloadError::Json {
            kind: expected,
            source,
        };
        match expected {
            CommandKind::Pairing => serde_json::from_slice(payload)
                .map(Reply::Pairing)
                .map_err(json_err),
            CommandKind::Otp => serde_json::from_slice(payload)
                .map(Reply::Otp)
                .map_err(json_err),
            CommandKind::Pull => serde_json::from_slice(payload)
                .map(Reply::Pull)
                .map_err(json_err),
            CommandKind::Store => serde_json::from_slice(payload)
                .map(Reply::Store)
                .map_err(json_err),
        }
    }

    /// The peer identity, for pairing replies.
    pub fn peer_name(&self) -> Option<&str> {
        match self {
            Reply::Pairing(m) => Some(&m.name),
            _ => None,
        }
    }

    /// The secret, for OTP and PULL replies.
    pub fn password(&self) -> Option<&str> {
        match self {
            Reply::Otp(m) | Reply::Pull(m) => Some(&m.password),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
