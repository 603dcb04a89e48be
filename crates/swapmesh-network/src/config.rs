//! Peer overlay configuration.
//!
//! All values have documented defaults. [`PeerOverlayConfig::validate`]
//! runs before the transport starts and rejects zero intervals, empty
//! protocol names and inconsistent connection thresholds.

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use swapmesh_types::{Result, SwapMeshError};

use crate::discovery::extract_peer_id;
use crate::relay::build_relay_listen_addr;

// ---------------------------------------------------------------------------
// Well-known bootstrap peers
// ---------------------------------------------------------------------------

/// Public libp2p bootstrap nodes used when no bootstrap list is
/// configured. They only seed the DHT; any reachable swapmesh peer
/// works just as well.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
];

// ---------------------------------------------------------------------------
// ConnectionManagerConfig
// ---------------------------------------------------------------------------

/// Thresholds for the periodic connection manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionManagerConfig {
    /// Upper bound on established peers. `None` means unbounded.
    pub max_connections: Option<u32>,

    /// Below this many peers the bootstrap list is redialed.
    pub min_connections: u32,

    /// How often the thresholds are checked, in milliseconds.
    pub poll_interval_ms: u64,

    /// Value assigned to peers nobody has scored. Lowest-valued peers
    /// are disconnected first when above `max_connections`.
    pub default_peer_value: f64,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: None,
            min_connections: 0,
            poll_interval_ms: 500,
            default_peer_value: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PeerOverlayConfig
// ---------------------------------------------------------------------------

/// Configuration of one overlay node. Immutable once the transport
/// has started.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerOverlayConfig {
    // -----------------------------------------------------------------------
    // Addresses
    // -----------------------------------------------------------------------

    /// Addresses to listen on. Empty selects
    /// [`effective_listen_addrs`](Self::effective_listen_addrs) defaults:
    /// one relay circuit per relay (see [`relays`](Self::relays)) plus
    /// `/ip4/0.0.0.0/tcp/0`.
    #[serde(with = "multiaddr_vec_serde")]
    pub listen_addrs: Vec<Multiaddr>,

    /// Peers dialed to join the network. Each needs a `/p2p/<id>` suffix.
    #[serde(with = "multiaddr_vec_serde")]
    pub bootstrap_peers: Vec<Multiaddr>,

    /// Relay servers used for circuit listen addresses. Empty falls back
    /// to the bootstrap peers.
    #[serde(with = "multiaddr_vec_serde")]
    pub relay_servers: Vec<Multiaddr>,

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Periodically redial bootstrap peers. Default: `true`.
    pub bootstrap_enabled: bool,

    /// Seconds between bootstrap rounds. Default: `10`.
    pub bootstrap_interval_secs: u64,

    /// Periodically query the DHT for a random key. Default: `true`.
    pub random_walk_enabled: bool,

    /// Seconds between random-walk queries. Default: `30`.
    pub random_walk_interval_secs: u64,

    /// mDNS discovery on the local network. Default: `false`.
    pub enable_mdns: bool,

    /// Kademlia protocol name; nodes with different names never talk
    /// DHT. Default: `/swapmesh/kad/1.0.0`.
    pub kad_protocol: String,

    /// Kademlia replication factor. Default: `20`.
    pub kad_replication_factor: usize,

    /// Seconds before a Kademlia query times out. Default: `30`.
    pub kad_query_timeout_secs: u64,

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Cap on simultaneous pending outgoing dials. Default: `100`.
    pub max_parallel_dials: u32,

    /// Concurrent dial attempts per peer (one per known address).
    /// Default: `100`.
    pub max_dials_per_peer: u8,

    /// Seconds before an idle connection is closed. Default: `60`.
    pub idle_timeout_secs: u64,

    /// Serve as a circuit relay for other peers. Default: `true`.
    pub enable_relay_server: bool,

    pub connection_manager: ConnectionManagerConfig,

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------

    /// Largest gossip payload accepted or published. Default: 64 KiB.
    pub max_message_size: usize,
}

impl Default for PeerOverlayConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Vec::new(),
            bootstrap_peers: DEFAULT_BOOTSTRAP_PEERS
                .iter()
                .filter_map(|s| s.parse::<Multiaddr>().ok())
                .collect(),
            relay_servers: Vec::new(),
            bootstrap_enabled: true,
            bootstrap_interval_secs: 10,
            random_walk_enabled: true,
            random_walk_interval_secs: 30,
            enable_mdns: false,
            kad_protocol: "/swapmesh/kad/1.0.0".into(),
            kad_replication_factor: 20,
            kad_query_timeout_secs: 30,
            max_parallel_dials: 100,
            max_dials_per_peer: 100,
            idle_timeout_secs: 60,
            enable_relay_server: true,
            connection_manager: ConnectionManagerConfig::default(),
            max_message_size: 65_536,
        }
    }
}

impl PeerOverlayConfig {
    /// A config for tests and local setups: loopback TCP on an
    /// OS-assigned port, no bootstrap peers, no relay serving.
    pub fn local() -> Self {
        let mut listen = Multiaddr::empty();
        listen.push(Protocol::Ip4(std::net::Ipv4Addr::LOCALHOST));
        listen.push(Protocol::Tcp(0));

        Self {
            listen_addrs: vec![listen],
            bootstrap_peers: Vec::new(),
            enable_relay_server: false,
            ..Self::default()
        }
    }

    /// Listen addresses in effect after applying defaults.
    pub fn effective_listen_addrs(&self) -> Vec<Multiaddr> {
        if !self.listen_addrs.is_empty() {
            return self.listen_addrs.clone();
        }

        let mut addrs: Vec<Multiaddr> = self
            .relays()
            .iter()
            .filter_map(|relay| {
                let (peer_id, clean) = extract_peer_id(relay)?;
                build_relay_listen_addr(&clean, &peer_id).ok()
            })
            .collect();

        let mut wildcard = Multiaddr::empty();
        wildcard.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        wildcard.push(Protocol::Tcp(0));
        addrs.push(wildcard);

        addrs
    }

    /// Relays reserved for circuit addresses: `relay_servers`, or the
    /// bootstrap peers when none are configured.
    pub fn relays(&self) -> &[Multiaddr] {
        if self.relay_servers.is_empty() {
            &self.bootstrap_peers
        } else {
            &self.relay_servers
        }
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        let positive = |value: u64, name: &str| -> Result<()> {
            if value == 0 {
                return Err(SwapMeshError::ConfigError {
                    reason: format!("{name} must be greater than 0"),
                });
            }
            Ok(())
        };

        positive(self.bootstrap_interval_secs, "bootstrap_interval_secs")?;
        positive(self.random_walk_interval_secs, "random_walk_interval_secs")?;
        positive(self.kad_query_timeout_secs, "kad_query_timeout_secs")?;
        positive(self.idle_timeout_secs, "idle_timeout_secs")?;
        positive(self.connection_manager.poll_interval_ms, "connection_manager.poll_interval_ms")?;
        positive(u64::from(self.max_parallel_dials), "max_parallel_dials")?;
        positive(u64::from(self.max_dials_per_peer), "max_dials_per_peer")?;
        positive(self.kad_replication_factor as u64, "kad_replication_factor")?;
        positive(self.max_message_size as u64, "max_message_size")?;

        if self.kad_protocol.is_empty() || !self.kad_protocol.starts_with('/') {
            return Err(SwapMeshError::ConfigError {
                reason: format!("kad_protocol must start with '/', got '{}'", self.kad_protocol),
            });
        }

        let cm = &self.connection_manager;
        if let Some(max) = cm.max_connections {
            if max == 0 {
                return Err(SwapMeshError::ConfigError {
                    reason: "connection_manager.max_connections must be greater than 0".into(),
                });
            }
            if cm.min_connections > max {
                return Err(SwapMeshError::ConfigError {
                    reason: format!(
                        "connection_manager.min_connections ({}) exceeds max_connections ({max})",
                        cm.min_connections
                    ),
                });
            }
        }
        if !cm.default_peer_value.is_finite() || cm.default_peer_value < 0.0 {
            return Err(SwapMeshError::ConfigError {
                reason: "connection_manager.default_peer_value must be a non-negative number".into(),
            });
        }

        if let Some(relay) = self
            .relay_servers
            .iter()
            .find(|addr| extract_peer_id(addr).is_none())
        {
            return Err(SwapMeshError::ConfigError {
                reason: format!("relay server {relay} is missing its /p2p/ component"),
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers: Multiaddr as strings
// ---------------------------------------------------------------------------

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addrs: &[Multiaddr], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
