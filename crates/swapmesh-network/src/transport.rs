//! Transport settings for the overlay swarm.
//!
//! The transport stack itself is assembled by the `SwarmBuilder` in
//! [`crate::swarm::OverlaySwarm::new`]:
//!
//! ```text
//! SwarmBuilder::with_existing_identity(keypair)
//!     .with_tokio()
//!     .with_tcp(tcp_config(), noise::Config::new, yamux::Config::default)?
//!     .with_quic()
//!     .with_dns()?
//!     .with_relay_client(noise::Config::new, yamux::Config::default)?
//!     .with_behaviour(|key, relay_client| { ... })?
//!     .with_swarm_config(swarm_config(..))
//!     .build()
//! ```
//!
//! Every connection is encrypted (Noise over TCP, TLS inside QUIC) and
//! multiplexed (Yamux over TCP, native streams in QUIC).

use std::num::NonZeroU8;
use std::time::Duration;

use libp2p::swarm;

use crate::config::PeerOverlayConfig;

/// TCP configuration with Nagle's algorithm disabled.
pub fn tcp_config() -> libp2p::tcp::Config {
    libp2p::tcp::Config::default().nodelay(true)
}

/// Swarm-level settings derived from the overlay config.
pub fn swarm_config(base: swarm::Config, config: &PeerOverlayConfig) -> swarm::Config {
    let dial_factor = NonZeroU8::new(config.max_dials_per_peer).unwrap_or(NonZeroU8::MIN);

    base.with_idle_connection_timeout(Duration::from_secs(config.idle_timeout_secs))
        .with_dial_concurrency_factor(dial_factor)
}
