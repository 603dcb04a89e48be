//! Swarm wrapper for the peer overlay.
//!
//! [`OverlaySwarm`] owns the libp2p `Swarm` with the combined
//! [`OverlayBehaviour`] and routes topic traffic to local subscribers.
//! It is driven one event at a time through [`OverlaySwarm::poll_next`]
//! by the overlay event loop.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use futures::StreamExt;
use libp2p::gossipsub::{self, TopicHash};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{connection_limits, identify, identity, kad, mdns, noise, relay, yamux};
use libp2p::{Multiaddr, PeerId, Swarm};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use swapmesh_types::SwapMeshError;

use crate::config::PeerOverlayConfig;
use crate::connection::{ConnectionAction, ConnectionManager};
use crate::discovery::{build_discovery_behaviour, extract_peer_id, DiscoveryBehaviour, DiscoveryBehaviourEvent};
use crate::events::TopicEvent;
use crate::gossip;
use crate::relay::{build_relay_server_behaviour, log_relay_client_event, log_relay_server_event};
use crate::transport;

type BResult<T> = std::result::Result<T, SwapMeshError>;

/// Buffered events per subscription before new ones are dropped.
pub const SUBSCRIPTION_BUFFER: usize = 1024;

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

#[derive(NetworkBehaviour)]
pub struct OverlayBehaviour {
    /// Kademlia + Identify.
    pub discovery: DiscoveryBehaviour,
    /// Topic pub/sub.
    pub gossip: gossipsub::Behaviour,
    /// Circuit relay client (transport side lives in the swarm builder).
    pub relay_client: relay::client::Behaviour,
    /// Circuit relay server, when enabled.
    pub relay_server: Toggle<relay::Behaviour>,
    /// LAN discovery, when enabled.
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    /// Caps pending outgoing dials.
    pub limits: connection_limits::Behaviour,
}

// ---------------------------------------------------------------------------
// OverlaySwarm
// ---------------------------------------------------------------------------

pub struct OverlaySwarm {
    swarm: Swarm<OverlayBehaviour>,
    /// Local subscribers per topic.
    subscribers: HashMap<TopicHash, Vec<mpsc::Sender<TopicEvent>>>,
    /// Remote peers known to be subscribed, per topic.
    topic_peers: HashMap<TopicHash, HashSet<PeerId>>,
    bootstrap_peers: Vec<Multiaddr>,
    bootstrap_interval: Duration,
    last_bootstrap_dial: Option<Instant>,
    connection_manager: ConnectionManager,
    max_message_size: usize,
}

impl OverlaySwarm {
    /// Builds the swarm. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if transport or behaviour construction
    /// fails.
    pub fn new(config: &PeerOverlayConfig, keypair: identity::Keypair) -> BResult<Self> {
        let behaviour_config = config.clone();

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(transport::tcp_config(), noise::Config::new, yamux::Config::default)
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_quic()
            .with_dns()
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to configure DNS transport: {e}"),
            })?
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to configure relay transport: {e}"),
            })?
            .with_behaviour(|key, relay_client| {
                build_overlay_behaviour(key, relay_client, &behaviour_config)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to build network behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| transport::swarm_config(cfg, config))
            .build();

        let added = swarm
            .behaviour_mut()
            .discovery
            .add_bootstrap_peers(&config.bootstrap_peers);
        if added > 0 {
            // Serve DHT queries without waiting for a confirmed external address.
            swarm.behaviour_mut().discovery.set_mode(kad::Mode::Server);
        }

        Ok(Self {
            swarm,
            subscribers: HashMap::new(),
            topic_peers: HashMap::new(),
            bootstrap_peers: config.bootstrap_peers.clone(),
            bootstrap_interval: Duration::from_secs(config.bootstrap_interval_secs),
            last_bootstrap_dial: None,
            connection_manager: ConnectionManager::new(config.connection_manager.clone()),
            max_message_size: config.max_message_size,
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    // -----------------------------------------------------------------------
    // Listening and dialing
    // -----------------------------------------------------------------------

    /// Starts listening on `addr`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the address cannot be bound.
    pub fn start_listening(&mut self, addr: Multiaddr) -> BResult<()> {
        self.swarm
            .listen_on(addr.clone())
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to listen on {addr}: {e}"),
            })?;
        Ok(())
    }

    /// Addresses currently listened on.
    pub fn listeners(&self) -> Vec<Multiaddr> {
        self.swarm.listeners().cloned().collect()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.swarm.connected_peers().copied().collect()
    }

    /// Dials `addr`. A `/p2p/<id>` suffix pins the expected peer.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the dial cannot be started.
    pub fn dial(&mut self, addr: Multiaddr) -> BResult<()> {
        self.swarm
            .dial(addr.clone())
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("failed to dial {addr}: {e}"),
            })
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Adds a local subscriber to `topic_name`.
    ///
    /// The new subscriber first receives a `PeerJoined` for every remote
    /// peer already known to be on the topic, then live events.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if gossipsub refuses the subscription.
    pub fn subscribe(&mut self, topic_name: &str) -> BResult<mpsc::Receiver<TopicEvent>> {
        gossip::subscribe(&mut self.swarm.behaviour_mut().gossip, topic_name)?;

        let hash = gossip::topic(topic_name).hash();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        if let Some(peers) = self.topic_peers.get(&hash) {
            for peer in peers {
                let _ = tx.try_send(TopicEvent::PeerJoined(*peer));
            }
        }

        self.subscribers.entry(hash).or_default().push(tx);
        tracing::debug!(topic = topic_name, "local subscriber added");
        Ok(rx)
    }

    /// Publishes `data` on `topic_name`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the payload is too large or nobody is
    /// listening yet.
    pub fn publish(&mut self, topic_name: &str, data: Vec<u8>) -> BResult<()> {
        let max = self.max_message_size;
        gossip::publish(&mut self.swarm.behaviour_mut().gossip, topic_name, data, max)
    }

    /// Remote peers currently subscribed to `topic_name`.
    pub fn topic_peers(&self, topic_name: &str) -> Vec<PeerId> {
        self.topic_peers
            .get(&gossip::topic(topic_name).hash())
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    fn dispatch(&mut self, topic: &TopicHash, event: TopicEvent) {
        let Some(senders) = self.subscribers.get_mut(topic) else {
            return;
        };

        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%topic, "subscriber lagging, topic event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    fn peer_joined(&mut self, topic: TopicHash, peer_id: PeerId) {
        if self.topic_peers.entry(topic.clone()).or_default().insert(peer_id) {
            self.dispatch(&topic, TopicEvent::PeerJoined(peer_id));
        }
    }

    fn peer_left(&mut self, topic: TopicHash, peer_id: PeerId) {
        let removed = self
            .topic_peers
            .get_mut(&topic)
            .map(|peers| peers.remove(&peer_id))
            .unwrap_or(false);
        if removed {
            self.dispatch(&topic, TopicEvent::PeerLeft(peer_id));
        }
    }

    // -----------------------------------------------------------------------
    // Periodic maintenance
    // -----------------------------------------------------------------------

    /// Dials every bootstrap peer that is not connected and starts a
    /// Kademlia bootstrap.
    pub fn bootstrap_round(&mut self) {
        self.dial_bootstrap_peers();

        if let Err(e) = self.swarm.behaviour_mut().discovery.bootstrap() {
            tracing::trace!(%e, "kademlia bootstrap skipped");
        }
    }

    /// One random-walk step, skipped while no peer is connected.
    pub fn random_walk(&mut self) {
        if self.swarm.connected_peers().next().is_none() {
            return;
        }
        let query = self.swarm.behaviour_mut().discovery.random_walk();
        tracing::trace!(?query, "random walk started");
    }

    /// Applies the connection manager thresholds.
    pub fn manage_connections(&mut self) {
        let connected = self.connected_peers();

        match self.connection_manager.evaluate(&connected) {
            ConnectionAction::Keep => {}
            ConnectionAction::DialBootstrap => {
                let due = self
                    .last_bootstrap_dial
                    .map_or(true, |at| at.elapsed() >= self.bootstrap_interval);
                if due {
                    tracing::debug!(connected = connected.len(), "below minimum connections, redialing");
                    self.dial_bootstrap_peers();
                }
            }
            ConnectionAction::Prune(peers) => {
                for peer_id in peers {
                    tracing::info!(%peer_id, "above maximum connections, disconnecting");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                }
            }
        }
    }

    pub fn set_peer_value(&mut self, peer_id: PeerId, value: f64) {
        self.connection_manager.set_peer_value(peer_id, value);
    }

    fn dial_bootstrap_peers(&mut self) {
        self.last_bootstrap_dial = Some(Instant::now());
        let local = *self.swarm.local_peer_id();

        for addr in self.bootstrap_peers.clone() {
            if let Some((peer_id, _)) = extract_peer_id(&addr) {
                if peer_id == local || self.swarm.is_connected(&peer_id) {
                    continue;
                }
            }
            if let Err(e) = self.swarm.dial(addr.clone()) {
                tracing::debug!(%addr, %e, "bootstrap dial not started");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event processing
    // -----------------------------------------------------------------------

    /// Drives the swarm forward by one event. Meant for `tokio::select!`.
    pub async fn poll_next(&mut self) {
        match self.swarm.select_next_some().await {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "listening");
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, ?endpoint, num_established, "connection established");
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, ?cause, num_established, "connection closed");
                if num_established == 0 {
                    self.handle_peer_disconnected(peer_id);
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::debug!(?peer_id, %error, "outgoing connection error");
            }

            SwarmEvent::IncomingConnectionError {
                local_addr,
                send_back_addr,
                error,
                ..
            } => {
                tracing::debug!(%local_addr, %send_back_addr, %error, "incoming connection error");
            }

            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),

            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    fn handle_peer_disconnected(&mut self, peer_id: PeerId) {
        let topics: Vec<TopicHash> = self
            .topic_peers
            .iter()
            .filter(|(_, peers)| peers.contains(&peer_id))
            .map(|(topic, _)| topic.clone())
            .collect();

        for topic in topics {
            self.peer_left(topic, peer_id);
        }
        self.connection_manager.forget(&peer_id);
    }

    fn handle_behaviour_event(&mut self, event: OverlayBehaviourEvent) {
        match event {
            OverlayBehaviourEvent::Discovery(DiscoveryBehaviourEvent::Kademlia(event)) => {
                handle_kademlia_event(event);
            }
            OverlayBehaviourEvent::Discovery(DiscoveryBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            OverlayBehaviourEvent::Gossip(event) => self.handle_gossip_event(event),
            OverlayBehaviourEvent::RelayClient(event) => log_relay_client_event(&event),
            OverlayBehaviourEvent::RelayServer(event) => log_relay_server_event(&event),
            OverlayBehaviourEvent::Mdns(event) => self.handle_mdns_event(event),
            OverlayBehaviourEvent::Limits(never) => match never {},
        }
    }

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                let Some(source) = message.source else {
                    tracing::warn!(%propagation_source, "dropping unsigned gossip message");
                    return;
                };
                self.dispatch(
                    &message.topic,
                    TopicEvent::Message {
                        source,
                        data: message.data,
                    },
                );
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer joined topic");
                self.peer_joined(topic, peer_id);
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                tracing::debug!(%peer_id, %topic, "peer left topic");
                self.peer_left(topic, peer_id);
            }
            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                tracing::debug!(
                    %peer_id,
                    agent_version = %info.agent_version,
                    listen_addrs = ?info.listen_addrs,
                    "identify: received peer info"
                );
                self.swarm
                    .behaviour_mut()
                    .discovery
                    .add_identified_addresses(&peer_id, &info.listen_addrs);
            }
            identify::Event::Error { peer_id, error, .. } => {
                tracing::debug!(%peer_id, %error, "identify: error");
            }
            other => {
                tracing::trace!(?other, "other identify event");
            }
        }
    }

    fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(peers) => {
                for (peer_id, addr) in peers {
                    tracing::debug!(%peer_id, %addr, "mDNS: discovered peer");
                    self.swarm
                        .behaviour_mut()
                        .discovery
                        .kademlia
                        .add_address(&peer_id, addr.clone());
                    if !self.swarm.is_connected(&peer_id) {
                        if let Err(e) = self.swarm.dial(addr) {
                            tracing::debug!(%peer_id, %e, "mDNS: dial not started");
                        }
                    }
                }
            }
            mdns::Event::Expired(peers) => {
                for (peer_id, addr) in peers {
                    tracing::trace!(%peer_id, %addr, "mDNS: peer expired");
                }
            }
        }
    }
}

fn handle_kademlia_event(event: kad::Event) {
    match event {
        kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
            kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk { peer, num_remaining })) => {
                tracing::debug!(?id, %peer, num_remaining, "kademlia bootstrap progress");
            }
            kad::QueryResult::Bootstrap(Err(e)) => {
                tracing::debug!(?id, ?e, "kademlia bootstrap failed");
            }
            kad::QueryResult::GetClosestPeers(Ok(ok)) => {
                tracing::trace!(?id, found = ok.peers.len(), "random walk finished");
            }
            kad::QueryResult::GetClosestPeers(Err(e)) => {
                tracing::trace!(?id, ?e, "random walk failed");
            }
            other => {
                tracing::trace!(?id, ?other, "other kademlia query result");
            }
        },
        kad::Event::RoutingUpdated { peer, addresses, .. } => {
            tracing::trace!(%peer, ?addresses, "kademlia routing table updated");
        }
        other => {
            tracing::trace!(?other, "other kademlia event");
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviour construction
// ---------------------------------------------------------------------------

fn build_overlay_behaviour(
    key: &identity::Keypair,
    relay_client: relay::client::Behaviour,
    config: &PeerOverlayConfig,
) -> BResult<OverlayBehaviour> {
    let local_peer_id = PeerId::from(key.public());

    let discovery = build_discovery_behaviour(key, config)?;
    let gossip = gossip::build_gossip_behaviour(key, config.max_message_size)?;
    let relay_server = build_relay_server_behaviour(local_peer_id, config.enable_relay_server);

    let mdns = if config.enable_mdns {
        let mdns_config = mdns::Config {
            ttl: Duration::from_secs(300),
            query_interval: Duration::from_secs(30),
            enable_ipv6: false,
        };
        let behaviour = mdns::tokio::Behaviour::new(mdns_config, local_peer_id).map_err(|e| {
            SwapMeshError::NetworkError {
                reason: format!("failed to create mDNS behaviour: {e}"),
            }
        })?;
        Some(behaviour)
    } else {
        None
    };

    let limits = connection_limits::Behaviour::new(
        connection_limits::ConnectionLimits::default()
            .with_max_pending_outgoing(Some(config.max_parallel_dials)),
    );

    Ok(OverlayBehaviour {
        discovery,
        gossip,
        relay_client,
        relay_server: Toggle::from(relay_server),
        mdns: Toggle::from(mdns),
        limits,
    })
}
