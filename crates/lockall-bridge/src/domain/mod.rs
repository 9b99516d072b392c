//! Domain layer for lockall-bridge.
//!
//! Pure types with no dependencies on I/O, networking, or async runtimes:
//!
//! - the JSON envelope exchanged with the browser extension
//! - the bridge configuration

pub mod config;
pub mod messages;

pub use config::BridgeConfig;
pub use messages::Envelope;
