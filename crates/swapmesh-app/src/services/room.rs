//! Peer overlay access for sibling services.

use std::any::Any;

use swapmesh_network::{PeerId, PeerOverlay, Subscription};
use swapmesh_types::{Result, ServiceName};

use crate::capability::Service;

/// Registered as [`ServiceName::Room`]. Wraps a running [`PeerOverlay`].
#[derive(Clone, Debug)]
pub struct RoomService {
    overlay: PeerOverlay,
}

impl RoomService {
    pub fn new(overlay: PeerOverlay) -> Self {
        Self { overlay }
    }

    pub fn peer_id(&self) -> PeerId {
        self.overlay.local_peer_id()
    }

    pub fn overlay(&self) -> &PeerOverlay {
        &self.overlay
    }

    /// Best-effort publish, see [`PeerOverlay::publish`].
    pub fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        self.overlay.publish(topic, data)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.overlay.subscribe(topic).await
    }
}

impl Service for RoomService {
    fn service_name(&self) -> ServiceName {
        ServiceName::Room
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
