//! TOML-based configuration persistence for the agent.
//!
//! Reads and writes `AgentConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Lockall\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/lockall/config.toml` (or `~/.config/lockall`)
//! - macOS:    `~/Library/Application Support/Lockall/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [agent]
//! device_name = "DESKTOP-42/alice"
//! log_level = "info"
//!
//! [network]
//! bind_address = "0.0.0.0"
//! advertise_address = "192.168.1.20"
//!
//! [bridge]
//! enabled = true
//! port = 42587
//! path = "/Lockall"
//! scope_suffix = "Google Chrome"
//!
//! [timeouts]
//! accept_secs = 120
//! reply_secs = 60
//! bridge_reply_secs = 120
//! ```
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file,
//! a missing section, or a missing key all fall back to the built-in value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lockall_bridge::domain::config::{
    BridgeConfig, DEFAULT_BRIDGE_PATH, DEFAULT_BRIDGE_PORT, DEFAULT_SCOPE_SUFFIX,
};

use crate::application::dispatch::Timeouts;
use crate::infrastructure::network::ListenerConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field does not parse.
    #[error("invalid {field} {value:?}")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// Identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Name sent to the companion during pairing, and the identity the
    /// companion's reply is checked against.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Socket transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Address the pairing listener binds.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// IPv4 address placed in pairing codes.  Discovered when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,
}

/// Browser bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Loopback port the extension connects to.
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// WebSocket request path.
    #[serde(default = "default_bridge_path")]
    pub path: String,
    /// Window-title suffix of the browser the extension lives in.
    #[serde(default = "default_scope_suffix")]
    pub scope_suffix: String,
}

/// Deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    /// How long a rendered code waits for the companion to connect.
    #[serde(default = "default_accept_secs")]
    pub accept_secs: u64,
    /// How long the companion has to answer a command.
    #[serde(default = "default_reply_secs")]
    pub reply_secs: u64,
    /// How long the browser extension has to answer a command.
    #[serde(default = "default_bridge_reply_secs")]
    pub bridge_reply_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

/// `HOST/user`, from the usual environment variables.
fn default_device_name() -> String {
    let host = std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "user".to_string());
    format!("{host}/{user}")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bridge_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}
fn default_bridge_path() -> String {
    DEFAULT_BRIDGE_PATH.to_string()
}
fn default_scope_suffix() -> String {
    DEFAULT_SCOPE_SUFFIX.to_string()
}
fn default_accept_secs() -> u64 {
    120
}
fn default_reply_secs() -> u64 {
    60
}
fn default_bridge_reply_secs() -> u64 {
    120
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            advertise_address: None,
        }
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_bridge_port(),
            path: default_bridge_path(),
            scope_suffix: default_scope_suffix(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            accept_secs: default_accept_secs(),
            reply_secs: default_reply_secs(),
            bridge_reply_secs: default_bridge_reply_secs(),
        }
    }
}

// ── Typed views ───────────────────────────────────────────────────────────────

impl AgentConfig {
    /// Settings for the loopback bridge server.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.bridge.port),
            path: self.bridge.path.clone(),
            scope_suffix: self.bridge.scope_suffix.clone(),
        }
    }

    /// Settings for per-dispatch pairing listeners.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if either address fails to parse.
    pub fn listener_config(&self) -> Result<ListenerConfig, ConfigError> {
        let bind_address = self
            .network
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "bind_address",
                value: self.network.bind_address.clone(),
            })?;
        let advertise_address = self
            .network
            .advertise_address
            .as_deref()
            .map(|value| {
                value
                    .parse::<Ipv4Addr>()
                    .map_err(|_| ConfigError::InvalidAddress {
                        field: "advertise_address",
                        value: value.to_string(),
                    })
            })
            .transpose()?;
        Ok(ListenerConfig {
            bind_address,
            advertise_address,
        })
    }

    /// Dispatch deadlines.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            accept: Duration::from_secs(self.timeouts.accept_secs),
            reply: Duration::from_secs(self.timeouts.reply_secs),
            bridge_reply: Duration::from_secs(self.timeouts.bridge_reply_secs),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AgentConfig` from the platform path.
///
/// # Errors
///
/// As [`load_config_from`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AgentConfig` from `path`, returning `AgentConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AgentConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AgentConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform path.
///
/// # Errors
///
/// As [`save_config_to`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn save_config(config: &AgentConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AgentConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `Lockall` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Lockall"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lockall"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Lockall")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
