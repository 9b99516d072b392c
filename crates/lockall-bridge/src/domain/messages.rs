//! JSON envelope for the browser-facing WebSocket protocol.
//!
//! Every message on the bridge is one WebSocket text frame holding a JSON
//! object with two fields:
//!
//! ```json
//! {"type":"PULL","payload":{"resourceId":"Inbox - Mail - Google Chrome"}}
//! {"type":"PULL","payload":{"password":"hunter2"}}
//! ```
//!
//! `type` is the command tag and `payload` the same JSON document the socket
//! transport carries inside a frame.  Host → extension frames are commands;
//! extension → host frames are replies.
//!
//! # Why keep `payload` as a raw JSON value?
//!
//! The extension may answer with a tag the host did not ask for, or with a
//! payload of the wrong shape.  Parsing the envelope loosely first lets the
//! application layer report exactly which of the two went wrong.

use serde::{Deserialize, Serialize};

/// One `{"type","payload"}` frame, before typed decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The command tag, e.g. `"STORE"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The payload document for that tag.  A missing field decodes as `null`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
