//! Order book actor.
//!
//! [`OrderBookService::spawn`] moves an [`OrderBook`] into a tokio task
//! that first subscribes to the orders topic. The task is the only
//! writer; it multiplexes with `tokio::select!`:
//!
//! 1. **Commands** from [`OrderBookHandle`]s (create, remove, queries).
//! 2. **Topic events**: remote creates/removes/snapshots, peers
//!    joining (re-announce) and leaving (prune).
//! 3. **Shutdown** via `watch` channel.
//!
//! Local changes are published fire-and-forget; a publish that cannot
//! be queued is logged and the local change stands.

use std::sync::Arc;

use swapmesh_network::{PeerId, PeerOverlay, TopicEvent};
use swapmesh_types::{Network, OrderId, Result, SwapMeshError};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::book::OrderBook;
use crate::config::{orders_topic, OrdersConfig};
use crate::order::{Order, OrderDraft, OrderStatus};
use crate::wire::{OrderMessage, WireOrder};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum OrderCommand {
    Create {
        draft: OrderDraft,
        reply: oneshot::Sender<Result<Order>>,
    },
    Remove {
        id: OrderId,
        reply: oneshot::Sender<Option<Order>>,
    },
    Items {
        reply: oneshot::Sender<Vec<Order>>,
    },
    Get {
        id: OrderId,
        reply: oneshot::Sender<Option<Order>>,
    },
    SetStatus {
        id: OrderId,
        status: OrderStatus,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveMyOrders {
        all_orders: bool,
        reply: oneshot::Sender<Vec<Order>>,
    },
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for OrderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create { draft, .. } => f.debug_struct("Create").field("draft", draft).finish_non_exhaustive(),
            Self::Remove { id, .. } => f.debug_struct("Remove").field("id", id).finish_non_exhaustive(),
            Self::Items { .. } => f.write_str("Items"),
            Self::Get { id, .. } => f.debug_struct("Get").field("id", id).finish_non_exhaustive(),
            Self::SetStatus { id, status, .. } => f
                .debug_struct("SetStatus")
                .field("id", id)
                .field("status", status)
                .finish_non_exhaustive(),
            Self::RemoveMyOrders { all_orders, .. } => f
                .debug_struct("RemoveMyOrders")
                .field("all_orders", all_orders)
                .finish_non_exhaustive(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderBookService
// ---------------------------------------------------------------------------

pub struct OrderBookService {
    book: OrderBook,
    overlay: PeerOverlay,
    topic: String,
    config: OrdersConfig,
}

impl OrderBookService {
    /// Starts the actor for the orders topic of `network`. Does not wait
    /// on the overlay; must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an invalid config.
    pub fn spawn(overlay: PeerOverlay, network: Network, config: OrdersConfig) -> Result<OrderBookHandle> {
        config.validate()?;

        let topic = orders_topic(network);
        let owner = overlay.local_peer_id().to_base58();

        let (command_tx, command_rx) = mpsc::channel(config.command_channel_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let service = Self {
            book: OrderBook::new(owner.clone()),
            overlay,
            topic: topic.clone(),
            config,
        };
        let task = tokio::spawn(service.run(command_rx, shutdown_rx));

        Ok(OrderBookHandle {
            owner,
            topic,
            command_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<OrderCommand>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut subscription = match self.overlay.subscribe(&self.topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(topic = %self.topic, %e, "order book cannot subscribe, exiting");
                return;
            }
        };
        tracing::info!(topic = %self.topic, "order book service started");

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => self.handle_command(cmd),

                Some(event) = subscription.recv() => self.handle_topic_event(event),

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(topic = %self.topic, "order book service exited");
    }

    fn handle_command(&mut self, cmd: OrderCommand) {
        tracing::trace!(?cmd, "order book command");

        match cmd {
            OrderCommand::Create { draft, reply } => {
                let result = self.book.create(draft);
                if let Ok(order) = &result {
                    tracing::info!(
                        id = %order.id,
                        sell = %order.sell_coin,
                        buy = %order.buy_coin,
                        "order created"
                    );
                    self.publish(&OrderMessage::Create(WireOrder::from(order)));
                }
                let _ = reply.send(result);
            }
            OrderCommand::Remove { id, reply } => {
                let removed = self.book.remove(&id);
                if let Some(order) = &removed {
                    self.announce_removed(order);
                }
                let _ = reply.send(removed);
            }
            OrderCommand::Items { reply } => {
                let _ = reply.send(self.book.items().cloned().collect());
            }
            OrderCommand::Get { id, reply } => {
                let _ = reply.send(self.book.get(&id).cloned());
            }
            OrderCommand::SetStatus { id, status, reply } => {
                let _ = reply.send(self.book.set_status(&id, status));
            }
            OrderCommand::RemoveMyOrders { all_orders, reply } => {
                let removed = self.book.remove_my_orders(all_orders);
                for order in &removed {
                    self.announce_removed(order);
                }
                tracing::debug!(count = removed.len(), all_orders, "removed own orders");
                let _ = reply.send(removed);
            }
        }
    }

    fn handle_topic_event(&mut self, event: TopicEvent) {
        match event {
            TopicEvent::Message { source, data } => match OrderMessage::decode(&data) {
                Ok(message) => self.apply_remote(source, message),
                Err(e) => tracing::warn!(%source, %e, "dropping order message"),
            },
            TopicEvent::PeerJoined(peer_id) => {
                if self.config.announce_on_peer_joined {
                    self.announce_snapshot(peer_id);
                }
            }
            TopicEvent::PeerLeft(peer_id) => {
                if self.config.prune_on_peer_left {
                    let pruned = self.book.remove_orders_of(&peer_id.to_base58());
                    if pruned > 0 {
                        tracing::debug!(%peer_id, pruned, "pruned orders of departed peer");
                    }
                }
            }
        }
    }

    fn apply_remote(&mut self, source: PeerId, message: OrderMessage) {
        let author = source.to_base58();

        match message {
            OrderMessage::Create(order) => self.insert_remote(&author, order),
            OrderMessage::Snapshot { orders } => {
                for order in orders {
                    self.insert_remote(&author, order);
                }
            }
            OrderMessage::Remove { id, .. } => match self.book.remove_remote(&author, &id) {
                Ok(true) => tracing::debug!(%id, %author, "remote order removed"),
                Ok(false) => {}
                Err(e) => tracing::warn!(%e, "rejected order removal"),
            },
        }
    }

    fn insert_remote(&mut self, author: &str, order: WireOrder) {
        let id = order.id;
        match self.book.insert_remote(author, order) {
            Ok(true) => tracing::debug!(%id, %author, "remote order added"),
            Ok(false) => {}
            Err(e) => tracing::warn!(%e, "rejected remote order"),
        }
    }

    fn announce_removed(&self, order: &Order) {
        if order.is_my {
            self.publish(&OrderMessage::Remove {
                id: order.id,
                owner: order.owner.clone(),
            });
        }
    }

    fn announce_snapshot(&self, peer_id: PeerId) {
        let orders: Vec<WireOrder> = self.book.my_orders().map(WireOrder::from).collect();
        if orders.is_empty() {
            return;
        }
        tracing::debug!(%peer_id, count = orders.len(), "re-announcing own orders");
        self.publish(&OrderMessage::Snapshot { orders });
    }

    fn publish(&self, message: &OrderMessage) {
        let result = message
            .encode()
            .and_then(|data| self.overlay.publish(&self.topic, data));
        if let Err(e) = result {
            tracing::warn!(%e, "order message not published");
        }
    }
}

// ---------------------------------------------------------------------------
// OrderBookHandle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running order book.
#[derive(Clone, Debug)]
pub struct OrderBookHandle {
    owner: String,
    topic: String,
    command_tx: mpsc::Sender<OrderCommand>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OrderBookHandle {
    /// Base58 peer id stamped on local orders.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Creates and announces an order.
    pub async fn create(&self, draft: OrderDraft) -> Result<Order> {
        self.request(|reply| OrderCommand::Create { draft, reply }).await?
    }

    /// Removes an order; the removal is announced if the order is ours.
    /// Unknown ids yield `None`.
    pub async fn remove(&self, id: OrderId) -> Result<Option<Order>> {
        self.request(|reply| OrderCommand::Remove { id, reply }).await
    }

    /// Snapshot of all orders in insertion order.
    pub async fn items(&self) -> Result<Vec<Order>> {
        self.request(|reply| OrderCommand::Items { reply }).await
    }

    pub async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.request(|reply| OrderCommand::Get { id, reply }).await
    }

    pub async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        self.request(|reply| OrderCommand::SetStatus { id, status, reply }).await?
    }

    /// See [`OrderBook::remove_my_orders`].
    pub async fn remove_my_orders(&self, all_orders: bool) -> Result<Vec<Order>> {
        self.request(|reply| OrderCommand::RemoveMyOrders { all_orders, reply })
            .await
    }

    /// Stops the actor and waits for it. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await.map_err(|e| SwapMeshError::RegistryError {
                reason: format!("order book task panicked: {e}"),
            })?;
        }
        Ok(())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> OrderCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| service_stopped())?;
        rx.await.map_err(|_| service_stopped())
    }
}

fn service_stopped() -> SwapMeshError {
    SwapMeshError::RegistryError {
        reason: "order book service is not running".into(),
    }
}
