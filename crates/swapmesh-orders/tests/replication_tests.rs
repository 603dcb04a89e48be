//! Order replication between two nodes over loopback.

use std::future::Future;
use std::time::Duration;

use swapmesh_network::{Multiaddr, PeerOverlay, PeerOverlayConfig};
use swapmesh_orders::{orders_topic, Order, OrderBookHandle, OrderBookService, OrderDraft, OrdersConfig};
use swapmesh_types::{Coin, Network, SwapMeshError};
use tokio::time::{sleep, timeout};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const WAIT: Duration = Duration::from_secs(20);

struct Node {
    overlay: PeerOverlay,
    orders: OrderBookHandle,
}

impl Node {
    async fn start() -> std::result::Result<Self, SwapMeshError> {
        let overlay = PeerOverlay::start(PeerOverlayConfig::local(), None).await?;
        let orders = OrderBookService::spawn(overlay.clone(), Network::Testnet, OrdersConfig::default())?;
        Ok(Self { overlay, orders })
    }

    async fn addr(&self) -> std::result::Result<Multiaddr, SwapMeshError> {
        loop {
            if let Some(addr) = self.overlay.listen_addrs().await?.into_iter().next() {
                return format!("{addr}/p2p/{}", self.overlay.local_peer_id())
                    .parse()
                    .map_err(|e| SwapMeshError::NetworkError {
                        reason: format!("bad dial address: {e}"),
                    });
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    async fn stop(self) -> std::result::Result<(), SwapMeshError> {
        self.orders.stop().await?;
        self.overlay.stop().await
    }
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_ok()
}

async fn connect(a: &Node, b: &Node) -> TestResult {
    b.overlay.dial(a.addr().await?).await?;
    let topic = &orders_topic(Network::Testnet);
    let joined = eventually(move || async move {
        let a_sees_b = a
            .overlay
            .topic_peers(topic)
            .await
            .map(|p| p.contains(&b.overlay.local_peer_id()))
            .unwrap_or(false);
        let b_sees_a = b
            .overlay
            .topic_peers(topic)
            .await
            .map(|p| p.contains(&a.overlay.local_peer_id()))
            .unwrap_or(false);
        a_sees_b && b_sees_a
    })
    .await;
    assert!(joined, "peers never met on the orders topic");
    Ok(())
}

fn draft() -> OrderDraft {
    OrderDraft {
        sell_coin: Coin::Btc,
        buy_coin: Coin::Eth,
        sell_amount: "0.5".parse().unwrap(),
        buy_amount: "8.25".parse().unwrap(),
    }
}

async fn holds(node: &Node, order: &Order) -> bool {
    node.orders
        .get(order.id)
        .await
        .ok()
        .flatten()
        .is_some()
}

async fn gone(node: &Node, order: &Order) -> bool {
    !holds(node, order).await
}

#[tokio::test(flavor = "multi_thread")]
async fn created_order_reaches_peer() -> TestResult {
    let a = Node::start().await?;
    let b = Node::start().await?;
    connect(&a, &b).await?;

    let order = a.orders.create(draft()).await?;
    assert!(eventually(|| holds(&b, &order)).await);

    let seen = b.orders.get(order.id).await?.ok_or("missing")?;
    assert!(!seen.is_my);
    assert_eq!(seen.owner, a.orders.owner());
    assert_eq!(seen.sell_amount, order.sell_amount);
    assert_eq!(seen.buy_coin, Coin::Eth);

    // Withdrawal by the owner propagates too.
    a.orders.remove(order.id).await?;
    assert!(eventually(|| gone(&b, &order)).await);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn late_joiner_receives_existing_orders() -> TestResult {
    let a = Node::start().await?;
    let order = a.orders.create(draft()).await?;

    let b = Node::start().await?;
    connect(&a, &b).await?;

    assert!(eventually(|| holds(&b, &order)).await);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn departed_peer_orders_are_pruned() -> TestResult {
    let a = Node::start().await?;
    let b = Node::start().await?;
    connect(&a, &b).await?;

    let order = a.orders.create(draft()).await?;
    assert!(eventually(|| holds(&b, &order)).await);

    a.stop().await?;
    assert!(eventually(|| gone(&b, &order)).await);

    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_my_orders_keeps_foreign() -> TestResult {
    let a = Node::start().await?;
    let b = Node::start().await?;
    connect(&a, &b).await?;

    let theirs = a.orders.create(draft()).await?;
    assert!(eventually(|| holds(&b, &theirs)).await);
    let mine = b.orders.create(draft()).await?;

    let removed = b.orders.remove_my_orders(false).await?;
    assert_eq!(removed.iter().map(|o| o.id).collect::<Vec<_>>(), vec![mine.id]);
    assert!(holds(&b, &theirs).await);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn handle_fails_after_stop() -> TestResult {
    let node = Node::start().await?;
    let orders = node.orders.clone();
    node.stop().await?;

    assert!(matches!(
        orders.items().await,
        Err(SwapMeshError::RegistryError { .. })
    ));
    assert!(orders.stop().await.is_ok());
    Ok(())
}
