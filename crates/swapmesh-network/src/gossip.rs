//! Gossipsub topic pub/sub.
//!
//! Messages are signed with the node key
//! (`MessageAuthenticity::Signed`) and strictly validated, so every
//! delivered message carries a verified `source`: the `PeerId` of its
//! original author, not of the peer that relayed it.

use libp2p::gossipsub;
use libp2p::identity;

use swapmesh_types::{Result, SwapMeshError};

/// Builds a `gossipsub::Behaviour` that accepts and publishes payloads
/// up to `max_message_size` bytes.
///
/// # Errors
///
/// Returns `NetworkError` if the gossipsub config is rejected.
pub fn build_gossip_behaviour(
    keypair: &identity::Keypair,
    max_message_size: usize,
) -> Result<gossipsub::Behaviour> {
    let config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(max_message_size)
        .validation_mode(gossipsub::ValidationMode::Strict)
        .build()
        .map_err(|e| SwapMeshError::NetworkError {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(keypair.clone()), config)
        .map_err(|e| SwapMeshError::NetworkError {
            reason: format!("failed to create gossipsub behaviour: {e}"),
        })
}

/// Creates a gossipsub [`IdentTopic`](gossipsub::IdentTopic) from a
/// topic name.
pub fn topic(name: &str) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(name)
}

/// Subscribes to `topic_name`. Returns `false` if already subscribed.
///
/// # Errors
///
/// Returns `NetworkError` if gossipsub refuses the subscription.
pub fn subscribe(behaviour: &mut gossipsub::Behaviour, topic_name: &str) -> Result<bool> {
    behaviour
        .subscribe(&topic(topic_name))
        .map_err(|e| SwapMeshError::NetworkError {
            reason: format!("failed to subscribe to topic '{topic_name}': {e}"),
        })
}

/// Publishes `data` on a topic.
///
/// # Errors
///
/// `NetworkError` if the payload exceeds `max_message_size` or
/// gossipsub cannot publish (for example, no peer is subscribed yet).
pub fn publish(
    behaviour: &mut gossipsub::Behaviour,
    topic_name: &str,
    data: Vec<u8>,
    max_message_size: usize,
) -> Result<()> {
    if data.len() > max_message_size {
        return Err(SwapMeshError::NetworkError {
            reason: format!(
                "gossip payload size {} exceeds maximum {max_message_size}",
                data.len()
            ),
        });
    }

    behaviour
        .publish(topic(topic_name), data)
        .map_err(|e| SwapMeshError::NetworkError {
            reason: format!("failed to publish to topic '{topic_name}': {e}"),
        })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
