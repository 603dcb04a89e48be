//! Two overlay nodes talking over loopback TCP.

use std::time::Duration;

use libp2p::multiaddr::Protocol;
use swapmesh_network::{Multiaddr, PeerOverlay, PeerOverlayConfig, PersistedIdentity, Subscription, TopicEvent};
use swapmesh_types::SwapMeshError;
use tokio::time::{sleep, timeout};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const TOPIC: &str = "swapmesh/testnet/test/1";
const WAIT: Duration = Duration::from_secs(15);

/// Starts a node with `RUST_LOG`-controlled output captured per test.
async fn start_node(
    config: PeerOverlayConfig,
    identity: Option<PersistedIdentity>,
) -> std::result::Result<PeerOverlay, SwapMeshError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    PeerOverlay::start(config, identity).await
}

async fn dialable_addr(node: &PeerOverlay) -> std::result::Result<Multiaddr, SwapMeshError> {
    loop {
        if let Some(addr) = node.listen_addrs().await?.into_iter().next() {
            let mut addr = addr;
            addr.push(Protocol::P2p(node.local_peer_id()));
            return Ok(addr);
        }
        sleep(Duration::from_millis(50)).await;
    }
}

async fn next_message(sub: &mut Subscription) -> Option<(libp2p::PeerId, Vec<u8>)> {
    while let Some(event) = sub.recv().await {
        if let TopicEvent::Message { source, data } = event {
            return Some((source, data));
        }
    }
    None
}

async fn wait_until_joined(sub: &mut Subscription, peer: libp2p::PeerId) -> bool {
    while let Some(event) = sub.recv().await {
        if event == TopicEvent::PeerJoined(peer) {
            return true;
        }
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn message_reaches_peer_with_author() -> TestResult {
    let a = start_node(PeerOverlayConfig::local(), None).await?;
    let b = start_node(PeerOverlayConfig::local(), None).await?;

    let mut sub_a = a.subscribe(TOPIC).await?;
    let mut sub_b = b.subscribe(TOPIC).await?;

    b.dial(timeout(WAIT, dialable_addr(&a)).await??).await?;

    assert!(timeout(WAIT, wait_until_joined(&mut sub_a, b.local_peer_id())).await?);
    assert!(timeout(WAIT, wait_until_joined(&mut sub_b, a.local_peer_id())).await?);

    a.publish(TOPIC, b"hello".to_vec())?;

    let (source, data) = timeout(WAIT, next_message(&mut sub_b))
        .await?
        .ok_or("subscription closed")?;
    assert_eq!(source, a.local_peer_id());
    assert_eq!(data, b"hello");

    assert!(a.connected_peers().await?.contains(&b.local_peer_id()));
    assert_eq!(a.topic_peers(TOPIC).await?, vec![b.local_peer_id()]);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn late_subscriber_sees_existing_peers() -> TestResult {
    let a = start_node(PeerOverlayConfig::local(), None).await?;
    let b = start_node(PeerOverlayConfig::local(), None).await?;

    let mut first = b.subscribe(TOPIC).await?;
    let _sub_a = a.subscribe(TOPIC).await?;
    b.dial(timeout(WAIT, dialable_addr(&a)).await??).await?;
    assert!(timeout(WAIT, wait_until_joined(&mut first, a.local_peer_id())).await?);

    // A second consumer of the same topic is told about A immediately.
    let mut second = b.subscribe(TOPIC).await?;
    assert_eq!(
        timeout(WAIT, second.recv()).await?,
        Some(TopicEvent::PeerJoined(a.local_peer_id()))
    );

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_left_reported_on_disconnect() -> TestResult {
    let a = start_node(PeerOverlayConfig::local(), None).await?;
    let b = start_node(PeerOverlayConfig::local(), None).await?;

    let mut sub_a = a.subscribe(TOPIC).await?;
    let _sub_b = b.subscribe(TOPIC).await?;
    b.dial(timeout(WAIT, dialable_addr(&a)).await??).await?;
    assert!(timeout(WAIT, wait_until_joined(&mut sub_a, b.local_peer_id())).await?);

    b.stop().await?;

    let left = timeout(WAIT, async {
        while let Some(event) = sub_a.recv().await {
            if event == TopicEvent::PeerLeft(b.local_peer_id()) {
                return true;
            }
        }
        false
    })
    .await?;
    assert!(left);

    a.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_peer_is_dialed_on_start() -> TestResult {
    let a = start_node(PeerOverlayConfig::local(), None).await?;
    let addr = timeout(WAIT, dialable_addr(&a)).await??;

    let config = PeerOverlayConfig {
        bootstrap_peers: vec![addr],
        ..PeerOverlayConfig::local()
    };
    let b = start_node(config, None).await?;

    let connected = timeout(WAIT, async {
        loop {
            if b.connected_peers().await?.contains(&a.local_peer_id()) {
                return Ok::<_, SwapMeshError>(());
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;
    connected?;

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn persisted_identity_survives_restart() -> TestResult {
    let first = start_node(PeerOverlayConfig::local(), None).await?;
    let identity = first.persisted_identity().clone();
    let peer_id = first.local_peer_id();
    first.stop().await?;

    let second = start_node(PeerOverlayConfig::local(), Some(identity)).await?;
    assert_eq!(second.local_peer_id(), peer_id);
    second.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn handle_errors_after_stop() -> TestResult {
    let node = start_node(PeerOverlayConfig::local(), None).await?;
    let clone = node.clone();
    node.stop().await?;

    // Second stop from another clone is a no-op.
    clone.stop().await?;

    assert!(clone.publish(TOPIC, b"late".to_vec()).is_err());
    assert!(clone.connected_peers().await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_rejected_before_start() {
    let config = PeerOverlayConfig {
        bootstrap_interval_secs: 0,
        ..PeerOverlayConfig::local()
    };
    let result = start_node(config, None).await;
    assert!(matches!(result, Err(SwapMeshError::ConfigError { .. })));
}
