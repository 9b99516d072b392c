//! Infrastructure layer for lockall-agent.
//!
//! Everything that touches the OS lives here: TCP sockets for the pairing
//! transport, the console renderer and outcome sink, the stdin intent
//! source, and the TOML configuration file.
//!
//! The application layer only sees the traits exported from these modules
//! ([`network::PeerEndpoint`], [`render::CodeRenderer`],
//! [`input::IntentSource`]), never the concrete types.

pub mod input;
pub mod network;
pub mod output;
pub mod render;
pub mod storage;
