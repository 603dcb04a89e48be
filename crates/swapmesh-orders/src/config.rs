//! Order book service configuration.

use serde::{Deserialize, Serialize};

use swapmesh_types::{Network, Result, SwapMeshError};

/// Gossip topic carrying order messages for `network`.
pub fn orders_topic(network: Network) -> String {
    format!("swapmesh/{}/orders/1", network.as_str())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    /// Drop a peer's orders once it leaves the orders topic.
    /// Default: `true`.
    pub prune_on_peer_left: bool,

    /// Re-announce our own orders whenever a peer joins the topic.
    /// Default: `true`.
    pub announce_on_peer_joined: bool,

    /// Bounded capacity of the service command channel. Default: `256`.
    pub command_channel_size: usize,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            prune_on_peer_left: true,
            announce_on_peer_joined: true,
            command_channel_size: 256,
        }
    }
}

impl OrdersConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_channel_size == 0 {
            return Err(SwapMeshError::ConfigError {
                reason: "orders.command_channel_size must be greater than 0".into(),
            });
        }
        Ok(())
    }
}
