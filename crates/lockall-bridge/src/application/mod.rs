//! Application layer for lockall-bridge.
//!
//! # Responsibilities
//!
//! - Translating typed commands into JSON envelopes and JSON envelopes back
//!   into typed replies (`bridge_service`)
//! - Holding the single live bridge connection for the process (`registry`)
//!
//! Sockets, task spawning and WebSocket framing live in the infrastructure
//! layer.

pub mod bridge_service;
pub mod registry;

pub use bridge_service::{command_to_text, message_type_name, reply_from_text, BridgeError};
pub use registry::{BridgeEntry, BridgeRegistry};
