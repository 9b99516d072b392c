//! # lockall-core
//!
//! Shared library for Lockall containing the endpoint header codec, the
//! command vocabulary, the wire framing, and the transport-agnostic channel
//! contract.
//!
//! This crate is used by both the host agent and the browser bridge.
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Lockall is a desktop credential helper.  A companion device (a phone app)
//! or a browser extension talks to the desktop over one of two transports:
//!
//! - a **socket** that the desktop opens on demand and advertises through a
//!   scannable code (the phone scans it and connects back exactly once), or
//! - a long-lived **bridge** WebSocket that the browser extension keeps open.
//!
//! Both transports exchange the same typed commands.  This crate defines:
//!
//! - **`protocol`** – How bytes travel.  The 9-byte `Header` tells a peer how
//!   to reach a listener, `Command`/`Reply` form the fixed vocabulary, and the
//!   frame codec delimits one command or reply on a byte stream.
//!
//! - **`channel`** – The `Channel` trait: "send one command, await exactly one
//!   reply", plus the error taxonomy shared by every transport.

pub mod channel;
pub mod protocol;

pub use channel::{Channel, ChannelError};
pub use protocol::code::{CodeError, OobCode};
pub use protocol::command::{
    Command, CommandKind, NameMessage, PasswordReply, PayloadError, Reply, ResourceRequest,
    StatusReply, StoreRequest,
};
pub use protocol::frame::{decode_frame, encode_frame, Frame, FrameError};
pub use protocol::header::{Header, HeaderError};
