//! libp2p peer overlay for swapmesh.
//!
//! Gives every swap participant a network identity, joins it to the
//! public overlay and offers topic-based pub/sub between peers.
//!
//! # Architecture
//!
//! - [`config`]: overlay configuration with defaults
//! - [`identity`]: persisted libp2p identities
//! - [`transport`]: TCP/QUIC/DNS transport settings
//! - [`discovery`]: Kademlia DHT + Identify (bootstrap, random walk)
//! - [`gossip`]: gossipsub topics
//! - [`relay`]: circuit relay client and server
//! - [`connection`]: connection manager thresholds
//! - [`swarm`]: swarm wrapper that routes topic events
//! - [`overlay`]: the running node and its handle

pub mod config;
pub mod connection;
pub mod discovery;
pub mod events;
pub mod gossip;
pub mod identity;
pub mod overlay;
pub mod relay;
pub mod swarm;
pub mod transport;

pub use config::PeerOverlayConfig;
pub use events::TopicEvent;
pub use identity::PersistedIdentity;
pub use libp2p::{Multiaddr, PeerId};
pub use overlay::{PeerOverlay, Subscription};
