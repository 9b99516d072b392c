//! Bridge configuration types.
//!
//! [`BridgeConfig`] is a plain struct with no environment reads inside it;
//! the agent populates it from its TOML configuration and CLI flags.

use std::net::{Ipv4Addr, SocketAddr};

/// Default loopback port the browser extension connects to.
pub const DEFAULT_BRIDGE_PORT: u16 = 42587;

/// Default WebSocket path the extension requests.
pub const DEFAULT_BRIDGE_PATH: &str = "/Lockall";

/// Default window-title suffix of the browser that hosts the extension.
pub const DEFAULT_SCOPE_SUFFIX: &str = "Google Chrome";

/// All runtime configuration for the bridge server.
///
/// # Example
///
/// ```rust
/// use lockall_bridge::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 42587);
/// assert_eq!(cfg.path, "/Lockall");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address the WebSocket server binds to.
    ///
    /// Loopback only: the bridge must never be reachable from the LAN.
    pub bind_addr: SocketAddr,

    /// Request path that is upgraded to a WebSocket; every other path is
    /// rejected during the handshake.
    pub path: String,

    /// A dispatch uses the bridge only when the focused window title ends
    /// with this suffix.
    pub scope_suffix: String,
}

impl Default for BridgeConfig {
    /// | Field        | Default             |
    /// |--------------|---------------------|
    /// | bind_addr    | `127.0.0.1:42587`   |
    /// | path         | `/Lockall`          |
    /// | scope_suffix | `Google Chrome`     |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_BRIDGE_PORT)),
            path: DEFAULT_BRIDGE_PATH.to_string(),
            scope_suffix: DEFAULT_SCOPE_SUFFIX.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Returns a copy bound to `port` on loopback.  Port `0` asks the OS for
    /// an ephemeral port, which tests use.
    pub fn on_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
