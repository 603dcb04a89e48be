//! Application-level configuration for the swap registry.
//!
//! Every value has a documented default; `validate()` is called by the
//! registry before any collaborator is wired.

use serde::{Deserialize, Serialize};

use crate::{Network, Result, SwapMeshError};

/// BTC addresses whose incoming funds are trusted without waiting for
/// confirmations, used when the configuration supplies none.
pub const DEFAULT_WHITELIST_BTC: [&str; 3] = [
    "mzgKwRsfYLgApStDLwcN9Y6ce9qYPnTJNx",
    "mst6jZKU973gB6Jhei4WQFg381zb86UgBQ",
    "17Hf3chwyWeNokLfuBcxEtpRYaYiU5RWBt",
];

/// Prefix applied to every key written through the app's storage adapter.
pub const DEFAULT_STORAGE_PREFIX: &str = "swap:";

/// Registry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapAppConfig {
    /// Chain family. Defaults to testnet.
    pub network: Network,

    /// Confirmation-exempt BTC addresses. `None` selects
    /// [`DEFAULT_WHITELIST_BTC`].
    pub whitelist_btc: Option<Vec<String>>,

    /// Key prefix for the wrapped storage collaborator.
    pub storage_prefix: String,
}

impl Default for SwapAppConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            whitelist_btc: None,
            storage_prefix: DEFAULT_STORAGE_PREFIX.into(),
        }
    }
}

impl SwapAppConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage_prefix.is_empty() {
            return Err(SwapMeshError::ConfigError {
                reason: "storage_prefix must not be empty".into(),
            });
        }

        if let Some(list) = &self.whitelist_btc {
            if let Some(bad) = list.iter().find(|a| a.trim().is_empty()) {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("whitelist_btc contains an empty address {bad:?}"),
                });
            }
        }

        Ok(())
    }

    /// The whitelist in effect: the configured one or the built-in defaults.
    pub fn effective_whitelist_btc(&self) -> Vec<String> {
        match &self.whitelist_btc {
            Some(list) => list.clone(),
            None => DEFAULT_WHITELIST_BTC.iter().map(|s| s.to_string()).collect(),
        }
    }
}
