//! Connection manager.
//!
//! Runs on every poll tick of the overlay loop. Below
//! `min_connections` it asks for the bootstrap list to be redialed;
//! above `max_connections` it picks the lowest-valued peers to drop.
//! Peers are valued `default_peer_value` until scored otherwise.

use std::collections::HashMap;

use libp2p::PeerId;

use crate::config::ConnectionManagerConfig;

/// What the overlay loop should do after a poll tick.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionAction {
    /// Within bounds.
    Keep,
    /// Too few peers: redial bootstrap peers.
    DialBootstrap,
    /// Too many peers: disconnect these, lowest value first.
    Prune(Vec<PeerId>),
}

#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionManagerConfig,
    peer_values: HashMap<PeerId, f64>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionManagerConfig) -> Self {
        Self {
            config,
            peer_values: HashMap::new(),
        }
    }

    /// Scores a peer. Higher values are kept longer.
    pub fn set_peer_value(&mut self, peer_id: PeerId, value: f64) {
        self.peer_values.insert(peer_id, value);
    }

    pub fn peer_value(&self, peer_id: &PeerId) -> f64 {
        self.peer_values
            .get(peer_id)
            .copied()
            .unwrap_or(self.config.default_peer_value)
    }

    /// Drops the score of a peer that is gone.
    pub fn forget(&mut self, peer_id: &PeerId) {
        self.peer_values.remove(peer_id);
    }

    /// Decides what to do given the currently connected peers.
    pub fn evaluate(&self, connected: &[PeerId]) -> ConnectionAction {
        let count = connected.len();

        if count < self.config.min_connections as usize {
            return ConnectionAction::DialBootstrap;
        }

        match self.config.max_connections {
            Some(max) if count > max as usize => {
                let mut ranked: Vec<(f64, PeerId)> = connected
                    .iter()
                    .map(|peer| (self.peer_value(peer), *peer))
                    .collect();
                ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

                let excess = count - max as usize;
                ConnectionAction::Prune(ranked.into_iter().take(excess).map(|(_, p)| p).collect())
            }
            _ => ConnectionAction::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(n: usize) -> Vec<PeerId> {
        (0..n).map(|_| PeerId::random()).collect()
    }

    #[test]
    fn unbounded_by_default() {
        let manager = ConnectionManager::new(ConnectionManagerConfig::default());
        assert_eq!(manager.evaluate(&peers(500)), ConnectionAction::Keep);
        assert_eq!(manager.evaluate(&[]), ConnectionAction::Keep);
    }

    #[test]
    fn below_minimum_redials() {
        let manager = ConnectionManager::new(ConnectionManagerConfig {
            min_connections: 3,
            ..ConnectionManagerConfig::default()
        });
        assert_eq!(manager.evaluate(&peers(2)), ConnectionAction::DialBootstrap);
        assert_eq!(manager.evaluate(&peers(3)), ConnectionAction::Keep);
    }

    #[test]
    fn above_maximum_prunes_lowest_values() {
        let mut manager = ConnectionManager::new(ConnectionManagerConfig {
            max_connections: Some(2),
            ..ConnectionManagerConfig::default()
        });
        let connected = peers(4);
        manager.set_peer_value(connected[1], 0.1);
        manager.set_peer_value(connected[3], 0.2);

        match manager.evaluate(&connected) {
            ConnectionAction::Prune(dropped) => {
                assert_eq!(dropped, vec![connected[1], connected[3]]);
            }
            other => panic!("expected prune, got {other:?}"),
        }
    }

    #[test]
    fn forgotten_peer_reverts_to_default_value() {
        let mut manager = ConnectionManager::new(ConnectionManagerConfig::default());
        let peer = PeerId::random();
        manager.set_peer_value(peer, 0.3);
        assert_eq!(manager.peer_value(&peer), 0.3);

        manager.forget(&peer);
        assert_eq!(manager.peer_value(&peer), 1.0);
    }
}
