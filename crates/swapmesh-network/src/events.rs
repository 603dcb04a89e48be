//! Events delivered to topic subscribers.

use libp2p::PeerId;

/// What a [`Subscription`](crate::overlay::Subscription) receives.
///
/// Membership events are derived from gossipsub subscription
/// announcements; a peer that disconnects is reported as having left
/// every topic it was in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicEvent {
    /// A message published on the topic.
    Message {
        /// Original author (verified signature), not the relaying peer.
        source: PeerId,
        data: Vec<u8>,
    },

    /// A remote peer subscribed to the topic.
    PeerJoined(PeerId),

    /// A remote peer unsubscribed or disconnected.
    PeerLeft(PeerId),
}
