//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use swapmesh_network::{Multiaddr, PeerOverlayConfig};
use swapmesh_orders::OrdersConfig;
use swapmesh_types::config::SwapAppConfig;
use swapmesh_types::Network;

/// Environment variable read for the wallet mnemonic by default.
pub const DEFAULT_MNEMONIC_ENV: &str = "SWAPMESH_MNEMONIC";

/// Identity file used when none is given.
pub const DEFAULT_IDENTITY_FILE: &str = "swapmesh-identity.json";

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// swapmesh daemon: headless peer for the atomic-swap order book.
#[derive(Debug, Parser)]
#[command(name = "swapmesh-daemon", version, about)]
pub struct CliArgs {
    /// Load settings from a JSON config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// P2P listen address (repeatable).
    #[arg(long, value_name = "MULTIADDR")]
    pub listen: Vec<Multiaddr>,

    /// Add a bootstrap peer (repeatable). Replaces the public defaults.
    #[arg(long, value_name = "MULTIADDR")]
    pub bootstrap: Vec<Multiaddr>,

    /// Chain family: mainnet or testnet.
    #[arg(long)]
    pub network: Option<Network>,

    /// Where the libp2p identity is loaded from and saved to.
    #[arg(long, value_name = "PATH")]
    pub identity_file: Option<PathBuf>,

    /// Environment variable holding the wallet mnemonic.
    #[arg(long, value_name = "VAR", default_value = DEFAULT_MNEMONIC_ENV)]
    pub mnemonic_env: String,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format. Every section is optional.
///
/// Example `daemon.json`:
/// ```json
/// {
///   "network": "testnet",
///   "identity_file": "/var/lib/swapmesh/identity.json",
///   "overlay": {
///     "listen_addrs": ["/ip4/0.0.0.0/tcp/4001"],
///     "enable_mdns": true
///   },
///   "orders": { "prune_on_peer_left": true },
///   "whitelist_btc": ["17Hf3chwyWeNokLfuBcxEtpRYaYiU5RWBt"]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub network: Network,
    pub identity_file: Option<PathBuf>,
    pub overlay: PeerOverlayConfig,
    pub orders: OrdersConfig,
    pub whitelist_btc: Option<Vec<String>>,
}

impl DaemonConfig {
    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;

        serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if !cli.listen.is_empty() {
            self.overlay.listen_addrs = cli.listen.clone();
        }
        if !cli.bootstrap.is_empty() {
            self.overlay.bootstrap_peers = cli.bootstrap.clone();
        }
        if let Some(network) = cli.network {
            self.network = network;
        }
        if let Some(path) = &cli.identity_file {
            self.identity_file = Some(path.clone());
        }
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), String> {
        self.overlay.validate().map_err(|e| e.to_string())?;
        self.orders.validate().map_err(|e| e.to_string())?;
        self.app_config().validate().map_err(|e| e.to_string())
    }

    pub fn identity_path(&self) -> PathBuf {
        self.identity_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_FILE))
    }

    pub fn app_config(&self) -> SwapAppConfig {
        SwapAppConfig {
            network: self.network,
            whitelist_btc: self.whitelist_btc.clone(),
            ..SwapAppConfig::default()
        }
    }
}
