//! Infrastructure layer for lockall-bridge.
//!
//! Handles all I/O: binding the loopback WebSocket listener, performing the
//! HTTP upgrade, and pumping text frames between each connection and its
//! [`channel::BridgeChannel`].
//!
//! Envelope translation lives in the application layer; message types live
//! in the domain layer.

pub mod channel;
pub mod ws_server;

pub use channel::{BridgeChannel, BridgeChannelIo};
pub use ws_server::{BridgeServer, BridgeServerError};
