//! Two swap apps, each with its own overlay, trading order intents over
//! loopback.

use std::sync::Arc;
use std::time::Duration;

use swapmesh_app::{AuthService, OrdersService, RoomService, Service, SwapApp, SwapAppOptions};
use swapmesh_network::{Multiaddr, PeerOverlay, PeerOverlayConfig};
use swapmesh_orders::{OrderDraft, OrdersConfig};
use swapmesh_types::config::SwapAppConfig;
use swapmesh_types::{Coin, Network, ServiceName, SwapMeshError};
use tokio::time::{sleep, timeout};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

const ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                     abandon abandon abandon abandon abandon about";

struct Peer {
    overlay: PeerOverlay,
    orders: Arc<OrdersService>,
    app: Arc<SwapApp>,
}

impl Peer {
    async fn start() -> std::result::Result<Self, SwapMeshError> {
        let overlay = PeerOverlay::start(PeerOverlayConfig::local(), None).await?;
        let orders = Arc::new(OrdersService::new(OrdersConfig::default()));
        let services: Vec<Arc<dyn Service>> = vec![
            Arc::new(AuthService::new(ABOUT, [Coin::Btc, Coin::Eth])?),
            Arc::new(RoomService::new(overlay.clone())),
            orders.clone(),
        ];
        let app = SwapApp::new(&SwapAppOptions {
            config: SwapAppConfig {
                network: Network::Testnet,
                ..SwapAppConfig::default()
            },
            services,
            ..SwapAppOptions::default()
        })?;
        Ok(Self { overlay, orders, app })
    }

    async fn dial_addr(&self) -> std::result::Result<Multiaddr, SwapMeshError> {
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

    async fn sees_on_orders_topic(&self, other: &Peer) -> bool {
        let Ok(orders) = self.orders.orders() else {
            return false;
        };
        self.overlay
            .topic_peers(orders.topic())
            .await
            .map(|peers| peers.contains(&other.overlay.local_peer_id()))
            .unwrap_or(false)
    }

    async fn stop(self) -> std::result::Result<(), SwapMeshError> {
        self.orders.stop().await?;
        self.overlay.stop().await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn order_created_on_one_app_reaches_the_other() -> TestResult {
    let a = Peer::start().await?;
    let b = Peer::start().await?;

    // Both registries resolved their services.
    for peer in [&a, &b] {
        assert!(peer.app.service(ServiceName::Room)?.is_some());
        assert!(peer.app.service(ServiceName::Auth)?.is_some());
        assert!(peer.orders.orders().is_ok());
    }

    b.overlay.dial(a.dial_addr().await?).await?;
    timeout(Duration::from_secs(20), async {
        while !(a.sees_on_orders_topic(&b).await && b.sees_on_orders_topic(&a).await) {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await?;

    let draft = OrderDraft {
        sell_coin: Coin::Btc,
        buy_coin: Coin::Eth,
        sell_amount: "0.1".parse()?,
        buy_amount: "1.75".parse()?,
    };
    let created = a.orders.orders()?.create(draft).await?;
    assert!(created.is_my);

    let b_orders = b.orders.orders()?;
    let seen = timeout(Duration::from_secs(20), async {
        loop {
            if let Ok(Some(order)) = b_orders.get(created.id).await {
                return order;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await?;

    assert!(!seen.is_my);
    assert_eq!(seen.id, created.id);
    assert_eq!(seen.owner, a.overlay.local_peer_id().to_base58());
    assert_eq!(seen.sell_coin, Coin::Btc);
    assert_eq!(seen.buy_coin, Coin::Eth);
    assert_eq!(seen.sell_amount, created.sell_amount);
    assert_eq!(seen.buy_amount, created.buy_amount);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn orders_service_stops_cleanly() -> TestResult {
    let peer = Peer::start().await?;
    let orders = peer.orders.orders()?;

    peer.orders.stop().await?;
    peer.orders.stop().await?;
    assert!(peer.orders.orders().is_err());
    assert!(orders.items().await.is_err());

    peer.overlay.stop().await?;
    Ok(())
}
