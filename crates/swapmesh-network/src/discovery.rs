//! Peer discovery: Kademlia DHT plus Identify.
//!
//! - **Bootstrap**: seeds the routing table with the configured peers
//!   and runs a Kademlia bootstrap.
//! - **Random walk**: periodically looks up the peers closest to a
//!   random key so the routing table keeps filling up.
//! - **Identify**: exchanges listen addresses on every connection; the
//!   swarm feeds them into Kademlia.

use std::num::NonZeroUsize;
use std::time::Duration;

use libp2p::identity;
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, Multiaddr, PeerId, StreamProtocol};

use swapmesh_types::SwapMeshError;

use crate::config::PeerOverlayConfig;

/// Local alias so we never shadow `std::result::Result` (which the
/// `#[derive(NetworkBehaviour)]` macro needs).
type BResult<T> = std::result::Result<T, SwapMeshError>;

/// Identify protocol name shared by all swapmesh nodes.
pub const IDENTIFY_PROTOCOL: &str = "/swapmesh/id/1.0.0";

// ---------------------------------------------------------------------------
// Combined NetworkBehaviour
// ---------------------------------------------------------------------------

#[derive(NetworkBehaviour)]
pub struct DiscoveryBehaviour {
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds a [`DiscoveryBehaviour`] from the given identity and config.
///
/// # Errors
///
/// Returns `ConfigError` if the replication factor is zero, or
/// `NetworkError` if the Kademlia protocol name is invalid.
pub fn build_discovery_behaviour(
    keypair: &identity::Keypair,
    config: &PeerOverlayConfig,
) -> BResult<DiscoveryBehaviour> {
    let local_peer_id = PeerId::from(keypair.public());

    let replication_factor = NonZeroUsize::new(config.kad_replication_factor).ok_or_else(|| {
        SwapMeshError::ConfigError {
            reason: "kad_replication_factor must be greater than 0".into(),
        }
    })?;

    let protocol = StreamProtocol::try_from_owned(config.kad_protocol.clone()).map_err(|e| {
        SwapMeshError::NetworkError {
            reason: format!("invalid Kademlia protocol name '{}': {e}", config.kad_protocol),
        }
    })?;

    let mut kad_config = kad::Config::new(protocol);
    kad_config.set_query_timeout(Duration::from_secs(config.kad_query_timeout_secs));
    kad_config.set_replication_factor(replication_factor);

    let store = kad::store::MemoryStore::new(local_peer_id);
    let kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);

    let identify_config = identify::Config::new(IDENTIFY_PROTOCOL.into(), keypair.public())
        .with_agent_version(format!("swapmesh/{}", env!("CARGO_PKG_VERSION")));
    let identify = identify::Behaviour::new(identify_config);

    Ok(DiscoveryBehaviour { kademlia, identify })
}

// ---------------------------------------------------------------------------
// DHT operations
// ---------------------------------------------------------------------------

impl DiscoveryBehaviour {
    /// Adds bootstrap peers to the Kademlia routing table.
    ///
    /// Addresses without a `/p2p/` component are skipped with a warning.
    /// Returns the number of peers added.
    pub fn add_bootstrap_peers(&mut self, peers: &[Multiaddr]) -> usize {
        let mut added = 0usize;

        for addr in peers {
            match extract_peer_id(addr) {
                Some((peer_id, clean_addr)) => {
                    self.kademlia.add_address(&peer_id, clean_addr);
                    added += 1;
                    tracing::debug!(%peer_id, %addr, "added bootstrap peer to routing table");
                }
                None => {
                    tracing::warn!(%addr, "skipping bootstrap peer: missing /p2p/ component");
                }
            }
        }

        added
    }

    /// Starts a Kademlia bootstrap.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the routing table is empty.
    pub fn bootstrap(&mut self) -> BResult<kad::QueryId> {
        self.kademlia
            .bootstrap()
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to start Kademlia bootstrap: {e}"),
            })
    }

    /// One random-walk step: looks up the peers closest to a random key.
    pub fn random_walk(&mut self) -> kad::QueryId {
        self.kademlia.get_closest_peers(PeerId::random())
    }

    /// Records addresses a peer reported through Identify.
    pub fn add_identified_addresses(&mut self, peer_id: &PeerId, addrs: &[Multiaddr]) {
        for addr in addrs {
            self.kademlia.add_address(peer_id, addr.clone());
        }
    }

    pub fn set_mode(&mut self, mode: kad::Mode) {
        self.kademlia.set_mode(Some(mode));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Splits a multiaddr into its `PeerId` and the address without the
/// `/p2p/` component.
///
/// `/ip4/1.2.3.4/tcp/4001/p2p/12D3KooW…` yields
/// `Some((PeerId, /ip4/1.2.3.4/tcp/4001))`. Returns `None` without a
/// `/p2p/` component. When there are several (relay circuits), the last
/// one wins.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut clean_addr = Multiaddr::empty();
    let mut peer_id = None;

    for proto in addr.iter() {
        match proto {
            Protocol::P2p(id) => peer_id = Some(id),
            other => clean_addr.push(other),
        }
    }

    peer_id.map(|pid| (pid, clean_addr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_peer_id_with_p2p_component() {
        let peer_id = PeerId::random();
        let addr: Multiaddr = format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer_id}")
            .parse()
            .unwrap();

        let (pid, clean) = extract_peer_id(&addr).unwrap();
        assert_eq!(pid, peer_id);
        assert_eq!(clean.to_string(), "/ip4/127.0.0.1/tcp/4001");
    }

    #[test]
    fn extract_peer_id_without_p2p_returns_none() {
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        assert!(extract_peer_id(&addr).is_none());
    }

    #[test]
    fn extract_peer_id_from_dnsaddr() {
        let addr: Multiaddr = crate::config::DEFAULT_BOOTSTRAP_PEERS[0].parse().unwrap();
        let (_, clean) = extract_peer_id(&addr).unwrap();
        assert_eq!(clean.to_string(), "/dnsaddr/bootstrap.libp2p.io");
    }

    #[test]
    fn build_discovery_behaviour_default_config() {
        let keypair = identity::Keypair::generate_ed25519();
        let result = build_discovery_behaviour(&keypair, &PeerOverlayConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn build_discovery_behaviour_zero_replication_fails() {
        let keypair = identity::Keypair::generate_ed25519();
        let config = PeerOverlayConfig {
            kad_replication_factor: 0,
            ..PeerOverlayConfig::default()
        };
        assert!(build_discovery_behaviour(&keypair, &config).is_err());
    }

    #[test]
    fn bootstrap_peers_without_id_are_skipped() {
        let keypair = identity::Keypair::generate_ed25519();
        let mut behaviour =
            build_discovery_behaviour(&keypair, &PeerOverlayConfig::local()).unwrap();

        let with_id: Multiaddr = format!("/ip4/10.0.0.1/tcp/4001/p2p/{}", PeerId::random())
            .parse()
            .unwrap();
        let without_id: Multiaddr = "/ip4/10.0.0.2/tcp/4001".parse().unwrap();

        assert_eq!(behaviour.add_bootstrap_peers(&[with_id, without_id]), 1);
    }

    #[test]
    fn bootstrap_with_empty_table_fails() {
        let keypair = identity::Keypair::generate_ed25519();
        let mut behaviour =
            build_discovery_behaviour(&keypair, &PeerOverlayConfig::local()).unwrap();
        assert!(behaviour.bootstrap().is_err());
    }
}
