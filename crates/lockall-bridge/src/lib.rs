//! lockall-bridge library crate.
//!
//! This crate lets the Lockall browser extension act as a long-lived command
//! peer.  The extension connects once to a loopback WebSocket endpoint; while
//! that connection stays open, the agent can send it commands (OTP, PULL,
//! STORE) without showing a scannable code.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser extension (JSON over WebSocket)
//!         ↕
//! [lockall-bridge]
//!   ├── domain/           Pure types: JSON envelope, BridgeConfig
//!   ├── application/      Envelope ↔ Command/Reply translation, BridgeRegistry
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         └── channel/    BridgeChannel: the Channel impl over one connection
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async code.
//! - `application` depends on `domain` and `lockall-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: envelope translation and the process-wide registry.
pub mod application;

/// Infrastructure layer: WebSocket server and the bridge channel.
pub mod infrastructure;

pub use application::registry::{BridgeEntry, BridgeRegistry};
pub use domain::config::BridgeConfig;
pub use infrastructure::channel::BridgeChannel;
pub use infrastructure::ws_server::{BridgeServer, BridgeServerError};
