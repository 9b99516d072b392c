//! Lockall agent entry point.
//!
//! Wires the bridge server, the pairing endpoint factory, the dispatcher and
//! the stdin intent source together, then runs until Ctrl+C or end of input.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load_config() + CLI overrides  -- --write-config saves them and exits
//!  ├─ BridgeServer::bind()           -- optional; failure only disables the fast path
//!  ├─ Dispatcher::new()              -- registry + SocketListenerFactory + renderer
//!  ├─ StdinIntentSource::start()     -- "pair", "otp", "pull", "store" lines
//!  └─ run_intent_loop()              -- one task per intent, outcomes to the console
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lockall_agent::application::{run_intent_loop, Dispatcher};
use lockall_agent::infrastructure::{
    input::{IntentSource, StdinIntentSource},
    network::{candidate_addresses, SocketListenerFactory},
    output::ConsoleSink,
    render::ConsoleRenderer,
    storage::config::{load_config, load_config_from, save_config, save_config_to, AgentConfig},
};
use lockall_bridge::{BridgeRegistry, BridgeServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Lockall desktop agent.
///
/// Serves credential requests from a paired phone (through scanned codes) and
/// from the Lockall browser extension (through a loopback WebSocket).
/// Command-line values override the configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "lockall-agent",
    about = "Pairing and remote-command host for the Lockall companion app",
    version
)]
struct Cli {
    /// Path to the configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "LOCKALL_CONFIG")]
    config: Option<PathBuf>,

    /// Loopback port for the browser extension bridge.
    #[arg(long, env = "LOCKALL_BRIDGE_PORT")]
    bridge_port: Option<u16>,

    /// Name sent to the companion during pairing.
    #[arg(long, env = "LOCKALL_DEVICE_NAME")]
    device_name: Option<String>,

    /// IPv4 address placed in pairing codes instead of the discovered one.
    #[arg(long, env = "LOCKALL_ADVERTISE_ADDRESS")]
    advertise_address: Option<Ipv4Addr>,

    /// Do not start the browser extension bridge.
    #[arg(long, env = "LOCKALL_NO_BRIDGE")]
    no_bridge: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Applies the command-line overrides on top of `base`.
    fn into_agent_config(self, mut base: AgentConfig) -> AgentConfig {
        if let Some(port) = self.bridge_port {
            base.bridge.port = port;
        }
        if let Some(name) = self.device_name {
            base.agent.device_name = name;
        }
        if let Some(addr) = self.advertise_address {
            base.network.advertise_address = Some(addr.to_string());
        }
        if self.no_bridge {
            base.bridge.enabled = false;
        }
        if let Some(level) = self.log_level {
            base.agent.log_level = level;
        }
        base
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    let config_path = cli.config.clone();
    let write_config = cli.write_config;
    let config = cli.into_agent_config(base);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level)),
        )
        .init();

    if write_config {
        match &config_path {
            Some(path) => save_config_to(&config, path)
                .with_context(|| format!("failed to write config to {}", path.display()))?,
            None => save_config(&config).context("failed to write config")?,
        }
        info!("configuration written");
        return Ok(());
    }

    info!("Lockall agent starting as {:?}", config.agent.device_name);

    let listener_config = config
        .listener_config()
        .context("invalid network configuration")?;
    if candidate_addresses(listener_config.advertise_address).is_empty() {
        warn!("no IPv4 interface found; pairing codes are unavailable until one appears");
    }

    // ── Shutdown token ────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                ctrl_c_cancel.cancel();
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Browser bridge ────────────────────────────────────────────────────────
    let registry = Arc::new(BridgeRegistry::new());
    if config.bridge.enabled {
        match BridgeServer::bind(config.bridge_config(), Arc::clone(&registry)).await {
            Ok(server) => {
                tokio::spawn(server.run(cancel.child_token()));
            }
            Err(e) => warn!("browser bridge disabled: {e}"),
        }
    } else {
        info!("browser bridge disabled by configuration");
    }

    // ── Dispatcher and intents ────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(SocketListenerFactory::new(listener_config)),
        Arc::new(ConsoleRenderer),
        config.timeouts(),
        config.agent.device_name.clone(),
    ));

    let source = StdinIntentSource::new();
    let intents = source.start().context("failed to start intent source")?;
    info!("ready; type pair, otp [title], pull <title> or store <credential> [title]");

    run_intent_loop(dispatcher, intents, Arc::new(ConsoleSink), cancel.clone()).await;

    source.stop();
    cancel.cancel();
    info!("Lockall agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_keeps_config() {
        // Arrange
        let cli = Cli::parse_from(["lockall-agent"]);
        let base = AgentConfig::default();

        // Act
        let config = cli.into_agent_config(base.clone());

        // Assert
        assert_eq!(config, base);
    }

    #[test]
    fn test_cli_bridge_port_override() {
        let cli = Cli::parse_from(["lockall-agent", "--bridge-port", "50001"]);
        let config = cli.into_agent_config(AgentConfig::default());
        assert_eq!(config.bridge.port, 50001);
        assert_eq!(config.bridge_config().bind_addr.port(), 50001);
    }

    #[test]
    fn test_cli_device_name_override() {
        let cli = Cli::parse_from(["lockall-agent", "--device-name", "LAPTOP/carol"]);
        let config = cli.into_agent_config(AgentConfig::default());
        assert_eq!(config.agent.device_name, "LAPTOP/carol");
    }

    #[test]
    fn test_cli_advertise_address_override() {
        let cli = Cli::parse_from(["lockall-agent", "--advertise-address", "10.1.2.3"]);
        let config = cli.into_agent_config(AgentConfig::default());
        assert_eq!(
            config.listener_config().unwrap().advertise_address,
            Some(Ipv4Addr::new(10, 1, 2, 3))
        );
    }

    #[test]
    fn test_cli_rejects_non_ipv4_advertise_address() {
        let result = Cli::try_parse_from(["lockall-agent", "--advertise-address", "::1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_no_bridge_disables_bridge() {
        let cli = Cli::parse_from(["lockall-agent", "--no-bridge"]);
        let config = cli.into_agent_config(AgentConfig::default());
        assert!(!config.bridge.enabled);
    }

    #[test]
    fn test_cli_log_level_override() {
        let cli = Cli::parse_from(["lockall-agent", "--log-level", "debug"]);
        let config = cli.into_agent_config(AgentConfig::default());
        assert_eq!(config.agent.log_level, "debug");
    }

    #[test]
    fn test_cli_write_config_flag() {
        let cli = Cli::parse_from(["lockall-agent", "--write-config"]);
        assert!(cli.write_config);
        assert!(!Cli::parse_from(["lockall-agent"]).write_config);
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::parse_from(["lockall-agent", "--config", "/tmp/lockall.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lockall.toml")));
    }
}
