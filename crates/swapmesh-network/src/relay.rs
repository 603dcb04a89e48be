//! Circuit Relay v2.
//!
//! - **Relay client**: built into the transport through
//!   `SwarmBuilder::with_relay_client`. Listening on
//!   `{relay}/p2p/{relay_id}/p2p-circuit` makes the node reachable
//!   through that relay when it sits behind a NAT.
//! - **Relay server**: lets this node relay circuits for others
//!   (`enable_relay_server`).

use libp2p::relay;
use libp2p::{Multiaddr, PeerId};

use swapmesh_types::SwapMeshError;

type BResult<T> = std::result::Result<T, SwapMeshError>;

/// Builds the relay server behaviour when `enable` is set. The caller
/// wraps the result in a `Toggle`.
pub fn build_relay_server_behaviour(local_peer_id: PeerId, enable: bool) -> Option<relay::Behaviour> {
    if enable {
        tracing::info!("relay server mode enabled");
        Some(relay::Behaviour::new(local_peer_id, relay::Config::default()))
    } else {
        tracing::debug!("relay server mode disabled");
        None
    }
}

/// Reservation address for listening through a relay:
/// `{relay_addr}/p2p/{relay_peer_id}/p2p-circuit`.
///
/// # Errors
///
/// Returns `NetworkError` if the result is not a valid multiaddr.
pub fn build_relay_listen_addr(relay_addr: &Multiaddr, relay_peer_id: &PeerId) -> BResult<Multiaddr> {
    format!("{relay_addr}/p2p/{relay_peer_id}/p2p-circuit")
        .parse()
        .map_err(|e| SwapMeshError::NetworkError {
            reason: format!("failed to build relay listen address: {e}"),
        })
}

/// Whether a multiaddr goes through a relay circuit.
pub fn is_circuit_addr(addr: &Multiaddr) -> bool {
    addr.iter()
        .any(|proto| matches!(proto, libp2p::multiaddr::Protocol::P2pCircuit))
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

pub fn log_relay_client_event(event: &relay::client::Event) {
    match event {
        relay::client::Event::ReservationReqAccepted {
            relay_peer_id,
            renewal,
            ..
        } => {
            tracing::info!(%relay_peer_id, renewal, "relay reservation accepted");
        }
        relay::client::Event::OutboundCircuitEstablished { relay_peer_id, .. } => {
            tracing::debug!(%relay_peer_id, "outbound relay circuit established");
        }
        relay::client::Event::InboundCircuitEstablished { src_peer_id, .. } => {
            tracing::debug!(%src_peer_id, "inbound relay circuit established");
        }
        #[allow(unreachable_patterns)]
        other => {
            tracing::trace!(?other, "relay client: other event");
        }
    }
}

pub fn log_relay_server_event(event: &relay::Event) {
    match event {
        relay::Event::ReservationReqAccepted {
            src_peer_id,
            renewed,
            ..
        } => {
            tracing::debug!(%src_peer_id, renewed, "relay server: reservation accepted");
        }
        relay::Event::ReservationReqDenied { src_peer_id, .. } => {
            tracing::warn!(%src_peer_id, "relay server: reservation denied");
        }
        relay::Event::CircuitReqAccepted {
            src_peer_id,
            dst_peer_id,
            ..
        } => {
            tracing::debug!(%src_peer_id, %dst_peer_id, "relay server: circuit accepted");
        }
        relay::Event::CircuitReqDenied {
            src_peer_id,
            dst_peer_id,
            ..
        } => {
            tracing::warn!(%src_peer_id, %dst_peer_id, "relay server: circuit denied");
        }
        other => {
            tracing::trace!(?other, "relay server: other event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_relay_listen_addr_valid() {
        let relay_addr: Multiaddr = "/ip4/1.2.3.4/tcp/4001".parse().unwrap();
        let relay_peer = PeerId::random();

        let addr = build_relay_listen_addr(&relay_addr, &relay_peer).unwrap();
        assert_eq!(
            addr.to_string(),
            format!("/ip4/1.2.3.4/tcp/4001/p2p/{relay_peer}/p2p-circuit")
        );
        assert!(is_circuit_addr(&addr));
    }

    #[test]
    fn plain_tcp_is_not_circuit() {
        let addr: Multiaddr = "/ip4/0.0.0.0/tcp/0".parse().unwrap();
        assert!(!is_circuit_addr(&addr));
    }

    #[test]
    fn relay_server_toggle() {
        assert!(build_relay_server_behaviour(PeerId::random(), true).is_some());
        assert!(build_relay_server_behaviour(PeerId::random(), false).is_none());
    }
}
