//! Peer overlay runtime.
//!
//! [`PeerOverlay::start`] builds the swarm, binds the listen addresses
//! and spawns the event loop as a tokio task. The returned handle is
//! cheap to clone; every clone talks to the same loop through a
//! bounded command channel.
//!
//! The loop multiplexes with `tokio::select!`:
//!
//! 1. **Swarm**: `poll_next()` drives libp2p and routes topic traffic.
//! 2. **Commands**: publish, subscribe, dial and queries from handles.
//! 3. **Bootstrap tick**: redials bootstrap peers, Kademlia bootstrap.
//! 4. **Random-walk tick**: DHT lookup of a random key.
//! 5. **Connection tick**: applies connection manager thresholds.
//! 6. **Shutdown**: `watch` channel flipped by [`PeerOverlay::stop`].

use std::sync::Arc;
use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use swapmesh_types::{Result, SwapMeshError};

use crate::config::PeerOverlayConfig;
use crate::events::TopicEvent;
use crate::identity::{export_identity, load_or_generate, PersistedIdentity};
use crate::relay::is_circuit_addr;
use crate::swarm::OverlaySwarm;

/// Bounded capacity of the command channel.
pub const COMMAND_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// OverlayCommand
// ---------------------------------------------------------------------------

pub(crate) enum OverlayCommand {
    /// Fire-and-forget publish.
    Publish { topic: String, data: Vec<u8> },
    Subscribe {
        topic: String,
        reply: oneshot::Sender<Result<mpsc::Receiver<TopicEvent>>>,
    },
    Dial {
        addr: Multiaddr,
        reply: oneshot::Sender<Result<()>>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    TopicPeers {
        topic: String,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    SetPeerValue { peer_id: PeerId, value: f64 },
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for OverlayCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish { topic, data } => f
                .debug_struct("Publish")
                .field("topic", topic)
                .field("len", &data.len())
                .finish(),
            Self::Subscribe { topic, .. } => {
                f.debug_struct("Subscribe").field("topic", topic).finish_non_exhaustive()
            }
            Self::Dial { addr, .. } => f.debug_struct("Dial").field("addr", addr).finish_non_exhaustive(),
            Self::ConnectedPeers { .. } => f.write_str("ConnectedPeers"),
            Self::ListenAddrs { .. } => f.write_str("ListenAddrs"),
            Self::TopicPeers { topic, .. } => {
                f.debug_struct("TopicPeers").field("topic", topic).finish_non_exhaustive()
            }
            Self::SetPeerValue { peer_id, value } => f
                .debug_struct("SetPeerValue")
                .field("peer_id", peer_id)
                .field("value", value)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Stream of events for one topic. Dropping it unsubscribes this
/// consumer; the node stays subscribed at the gossip level.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<TopicEvent>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event, or `None` once the overlay has stopped.
    pub async fn recv(&mut self) -> Option<TopicEvent> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// PeerOverlay
// ---------------------------------------------------------------------------

/// Handle to a running overlay node.
#[derive(Clone, Debug)]
pub struct PeerOverlay {
    local_peer_id: PeerId,
    identity: PersistedIdentity,
    command_tx: mpsc::Sender<OverlayCommand>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PeerOverlay {
    /// Starts an overlay node.
    ///
    /// A usable `persisted` identity is reused; a missing or broken one
    /// is replaced by a fresh key (see [`load_or_generate`]).
    ///
    /// # Errors
    ///
    /// - `ConfigError` if the config is invalid.
    /// - `NetworkError` if the swarm cannot be built or a direct listen
    ///   address cannot be bound. Relay circuit listens fail softly.
    pub async fn start(config: PeerOverlayConfig, persisted: Option<PersistedIdentity>) -> Result<Self> {
        config.validate()?;

        let keypair = load_or_generate(persisted.as_ref());
        let identity = export_identity(&keypair)?;

        let mut swarm = OverlaySwarm::new(&config, keypair)?;
        let local_peer_id = *swarm.local_peer_id();

        for addr in config.effective_listen_addrs() {
            if is_circuit_addr(&addr) {
                if let Err(e) = swarm.start_listening(addr) {
                    tracing::warn!(%e, "relay listen address unavailable");
                }
            } else {
                swarm.start_listening(addr)?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = OverlayRuntime {
            swarm,
            command_rx,
            shutdown_rx,
            bootstrap_enabled: config.bootstrap_enabled && !config.bootstrap_peers.is_empty(),
            bootstrap_interval: Duration::from_secs(config.bootstrap_interval_secs),
            random_walk_enabled: config.random_walk_enabled,
            random_walk_interval: Duration::from_secs(config.random_walk_interval_secs),
            poll_interval: Duration::from_millis(config.connection_manager.poll_interval_ms),
        };

        let task = tokio::spawn(run_overlay_loop(runtime));
        tracing::info!(%local_peer_id, "peer overlay started");

        Ok(Self {
            local_peer_id,
            identity,
            command_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// The identity this node runs with, ready to persist.
    pub fn persisted_identity(&self) -> &PersistedIdentity {
        &self.identity
    }

    /// Publishes `data` on `topic`. Never waits on the network: the
    /// payload is queued for the event loop and delivery is best effort.
    ///
    /// # Errors
    ///
    /// `NetworkError` if the overlay has stopped or its queue is full.
    pub fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        self.command_tx
            .try_send(OverlayCommand::Publish {
                topic: topic.to_string(),
                data,
            })
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("cannot queue publish on '{topic}': {e}"),
            })
    }

    /// Subscribes to `topic`.
    ///
    /// # Errors
    ///
    /// `NetworkError` if the overlay has stopped or gossipsub refuses
    /// the subscription.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let rx = self
            .request(|reply| OverlayCommand::Subscribe {
                topic: topic.to_string(),
                reply,
            })
            .await??;
        Ok(Subscription {
            topic: topic.to_string(),
            rx,
        })
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<()> {
        self.request(|reply| OverlayCommand::Dial { addr, reply }).await?
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerId>> {
        self.request(|reply| OverlayCommand::ConnectedPeers { reply }).await
    }

    /// Addresses the node currently listens on. Empty until the
    /// transport has reported its bound ports.
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        self.request(|reply| OverlayCommand::ListenAddrs { reply }).await
    }

    /// Remote peers currently subscribed to `topic`.
    pub async fn topic_peers(&self, topic: &str) -> Result<Vec<PeerId>> {
        self.request(|reply| OverlayCommand::TopicPeers {
            topic: topic.to_string(),
            reply,
        })
        .await
    }

    /// Scores a peer for the connection manager.
    pub fn set_peer_value(&self, peer_id: PeerId, value: f64) -> Result<()> {
        self.command_tx
            .try_send(OverlayCommand::SetPeerValue { peer_id, value })
            .map_err(|e| SwapMeshError::NetworkError {
                reason: format!("cannot queue peer value: {e}"),
            })
    }

    /// Stops the event loop and waits for it to exit. Calling it again,
    /// from any clone, is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await.map_err(|e| SwapMeshError::NetworkError {
                reason: format!("overlay event loop panicked: {e}"),
            })?;
            tracing::info!(local_peer_id = %self.local_peer_id, "peer overlay stopped");
        }
        Ok(())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> OverlayCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| overlay_stopped())?;
        rx.await.map_err(|_| overlay_stopped())
    }
}

fn overlay_stopped() -> SwapMeshError {
    SwapMeshError::NetworkError {
        reason: "peer overlay is not running".into(),
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct OverlayRuntime {
    swarm: OverlaySwarm,
    command_rx: mpsc::Receiver<OverlayCommand>,
    shutdown_rx: watch::Receiver<bool>,
    bootstrap_enabled: bool,
    bootstrap_interval: Duration,
    random_walk_enabled: bool,
    random_walk_interval: Duration,
    poll_interval: Duration,
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run_overlay_loop(mut rt: OverlayRuntime) {
    tracing::debug!("overlay event loop started");

    let mut bootstrap_tick = ticker(rt.bootstrap_interval);
    let mut random_walk_tick = ticker(rt.random_walk_interval);
    let mut connection_tick = ticker(rt.poll_interval);

    loop {
        tokio::select! {
            _ = rt.swarm.poll_next() => {}

            Some(cmd) = rt.command_rx.recv() => {
                handle_command(cmd, &mut rt.swarm);
            }

            _ = bootstrap_tick.tick(), if rt.bootstrap_enabled => {
                rt.swarm.bootstrap_round();
            }

            _ = random_walk_tick.tick(), if rt.random_walk_enabled => {
                rt.swarm.random_walk();
            }

            _ = connection_tick.tick() => {
                rt.swarm.manage_connections();
            }

            changed = rt.shutdown_rx.changed() => {
                // All handles dropped counts as a shutdown request.
                if changed.is_err() || *rt.shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("overlay event loop exited");
}

fn handle_command(cmd: OverlayCommand, swarm: &mut OverlaySwarm) {
    tracing::trace!(?cmd, "overlay command");

    match cmd {
        OverlayCommand::Publish { topic, data } => {
            if let Err(e) = swarm.publish(&topic, data) {
                tracing::debug!(%topic, %e, "publish not delivered");
            }
        }
        OverlayCommand::Subscribe { topic, reply } => {
            let _ = reply.send(swarm.subscribe(&topic));
        }
        OverlayCommand::Dial { addr, reply } => {
            let _ = reply.send(swarm.dial(addr));
        }
        OverlayCommand::ConnectedPeers { reply } => {
            let _ = reply.send(swarm.connected_peers());
        }
        OverlayCommand::ListenAddrs { reply } => {
            let _ = reply.send(swarm.listeners());
        }
        OverlayCommand::TopicPeers { topic, reply } => {
            let _ = reply.send(swarm.topic_peers(&topic));
        }
        OverlayCommand::SetPeerValue { peer_id, value } => {
            swarm.set_peer_value(peer_id, value);
        }
    }
}
