//! In-memory order book.
//!
//! Orders live in an insertion-ordered arena (`BTreeMap` keyed by a
//! monotonically increasing sequence number) with an id index on the
//! side. The book is synchronous and has a single owner; concurrency
//! is handled by [`crate::service::OrderBookService`].
//!
//! Gossip gives no ordering guarantee, so withdrawn ids are remembered
//! as tombstones (owner of the withdrawal, bounded FIFO). A `create` or
//! `snapshot` that arrives after its `remove` is ignored.

use std::collections::{BTreeMap, HashMap, VecDeque};

use swapmesh_types::{OrderId, Result, SwapMeshError};

use crate::order::{new_order_id, Order, OrderDraft, OrderStatus};
use crate::wire::WireOrder;

/// Withdrawn ids kept before the oldest is forgotten.
pub const MAX_TOMBSTONES: usize = 4096;

#[derive(Debug)]
pub struct OrderBook {
    /// Base58 peer id of the local node.
    owner: String,
    next_seq: u64,
    orders: BTreeMap<u64, Order>,
    index: HashMap<OrderId, u64>,
    /// Withdrawn id -> owner that withdrew it.
    tombstones: HashMap<OrderId, String>,
    tombstone_order: VecDeque<OrderId>,
}

impl OrderBook {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            next_seq: 0,
            orders: BTreeMap::new(),
            index: HashMap::new(),
            tombstones: HashMap::new(),
            tombstone_order: VecDeque::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Stores a new local order with a fresh id.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if the draft trades a coin for itself.
    pub fn create(&mut self, draft: OrderDraft) -> Result<Order> {
        draft.validate()?;

        let order = Order {
            id: new_order_id(&self.owner),
            owner: self.owner.clone(),
            sell_coin: draft.sell_coin,
            buy_coin: draft.buy_coin,
            sell_amount: draft.sell_amount,
            buy_amount: draft.buy_amount,
            is_my: true,
            status: OrderStatus::Idle,
        };
        self.insert(order.clone());
        Ok(order)
    }

    /// Removes an order. Unknown ids are a no-op. A removed id is
    /// never re-added from the network.
    pub fn remove(&mut self, id: &OrderId) -> Option<Order> {
        let order = self.take(id)?;
        self.bury(*id, order.owner.clone());
        Some(order)
    }

    /// Whether `id` was withdrawn and is still remembered.
    pub fn is_withdrawn(&self, id: &OrderId) -> bool {
        self.tombstones.contains_key(id)
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.index.get(id).and_then(|seq| self.orders.get(seq))
    }

    /// All orders in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn my_orders(&self) -> impl Iterator<Item = &Order> {
        self.items().filter(|o| o.is_my)
    }

    /// # Errors
    ///
    /// `InvalidOrder` if the id is unknown.
    pub fn set_status(&mut self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let order = self
            .index
            .get(id)
            .and_then(|seq| self.orders.get_mut(seq))
            .ok_or_else(|| SwapMeshError::InvalidOrder {
                reason: format!("unknown order {id}"),
            })?;
        order.status = status;
        Ok(())
    }

    /// Removes this node's orders that nobody has requested. Unless
    /// `all_orders` is set, orders already processing are kept as well.
    /// Foreign orders are never touched. Returns the removed orders.
    pub fn remove_my_orders(&mut self, all_orders: bool) -> Vec<Order> {
        let doomed: Vec<OrderId> = self
            .my_orders()
            .filter(|o| !o.is_requested() && (all_orders || !o.is_processing()))
            .map(|o| o.id)
            .collect();

        doomed.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Adds an order announced by `author`.
    ///
    /// Returns `Ok(false)` if the id is already known or its owner has
    /// already withdrawn it.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `author` is not the order's owner.
    pub fn insert_remote(&mut self, author: &str, order: WireOrder) -> Result<bool> {
        if order.owner != author {
            return Err(SwapMeshError::InvalidOrder {
                reason: format!(
                    "order {} claims owner {} but was announced by {author}",
                    order.id, order.owner
                ),
            });
        }
        if self.index.contains_key(&order.id) {
            return Ok(false);
        }
        if self.tombstones.get(&order.id).is_some_and(|by| *by == order.owner) {
            tracing::debug!(id = %order.id, "ignoring announcement of withdrawn order");
            return Ok(false);
        }

        self.insert(order.into_foreign_order());
        Ok(true)
    }

    /// Removes an order on behalf of `author`.
    ///
    /// Returns `Ok(false)` if the id is unknown; the withdrawal is still
    /// recorded so a late announcement by `author` is ignored.
    ///
    /// # Errors
    ///
    /// `InvalidOrder` if `author` does not own the stored order.
    pub fn remove_remote(&mut self, author: &str, id: &OrderId) -> Result<bool> {
        let owner = match self.get(id) {
            None => {
                self.bury(*id, author.to_string());
                return Ok(false);
            }
            Some(order) => order.owner.clone(),
        };
        if owner != author {
            return Err(SwapMeshError::InvalidOrder {
                reason: format!("{author} may not remove order {id} owned by {owner}"),
            });
        }
        Ok(self.remove(id).is_some())
    }

    /// Drops every foreign order owned by `owner`. Returns how many.
    /// The orders are not withdrawn: a returning owner may announce
    /// them again.
    pub fn remove_orders_of(&mut self, owner: &str) -> usize {
        let doomed: Vec<OrderId> = self
            .items()
            .filter(|o| !o.is_my && o.owner == owner)
            .map(|o| o.id)
            .collect();

        doomed.iter().filter(|id| self.take(id).is_some()).count()
    }

    fn insert(&mut self, order: Order) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(order.id, seq);
        self.orders.insert(seq, order);
    }

    fn take(&mut self, id: &OrderId) -> Option<Order> {
        let seq = self.index.remove(id)?;
        self.orders.remove(&seq)
    }

    fn bury(&mut self, id: OrderId, owner: String) {
        if self.tombstones.insert(id, owner).is_some() {
            return;
        }
        self.tombstone_order.push_back(id);
        while self.tombstone_order.len() > MAX_TOMBSTONES {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapmesh_types::Coin;

    use crate::order::compute_order_id;

    const ME: &str = "12D3KooWLocal";
    const BOB: &str = "12D3KooWBob";

    fn draft(sell: &str) -> OrderDraft {
        OrderDraft {
            sell_coin: Coin::Btc,
            buy_coin: Coin::Eth,
            sell_amount: sell.parse().unwrap(),
            buy_amount: "1".parse().unwrap(),
        }
    }

    fn foreign(owner: &str, n: u8) -> WireOrder {
        WireOrder {
            id: compute_order_id(owner, 0, &[n]),
            owner: owner.into(),
            sell_coin: Coin::Eth,
            buy_coin: Coin::Btc,
            sell_amount: "3".parse().unwrap(),
            buy_amount: "0.2".parse().unwrap(),
        }
    }

    #[test]
    fn create_remove_and_items() {
        let mut book = OrderBook::new(ME);
        let a = book.create(draft("1")).unwrap();
        let b = book.create(draft("2")).unwrap();
        let c = book.create(draft("3")).unwrap();

        assert!(a.is_my && a.owner == ME && a.status == OrderStatus::Idle);
        let ids: Vec<_> = book.items().map(|o| o.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);

        assert_eq!(book.remove(&b.id).map(|o| o.id), Some(b.id));
        let ids: Vec<_> = book.items().map(|o| o.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn removing_unknown_id_is_noop() {
        let mut book = OrderBook::new(ME);
        book.create(draft("1")).unwrap();
        assert!(book.remove(&compute_order_id("x", 0, &[])).is_none());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn remove_my_orders_selection() {
        // (status, removed when all_orders = false, removed when all_orders = true)
        let matrix = [
            (OrderStatus::Idle, true, true),
            (OrderStatus::Requested, false, false),
            (OrderStatus::Processing, false, true),
        ];

        for all_orders in [false, true] {
            let mut book = OrderBook::new(ME);
            let mut expected_removed = Vec::new();
            for (status, when_some, when_all) in matrix {
                let order = book.create(draft("1")).unwrap();
                book.set_status(&order.id, status).unwrap();
                if (all_orders && when_all) || (!all_orders && when_some) {
                    expected_removed.push(order.id);
                }
            }
            let theirs = foreign(BOB, 1);
            book.insert_remote(BOB, theirs.clone()).unwrap();

            let removed: Vec<_> = book.remove_my_orders(all_orders).iter().map(|o| o.id).collect();
            assert_eq!(removed, expected_removed, "all_orders = {all_orders}");
            assert!(book.get(&theirs.id).is_some());
        }
    }

    #[test]
    fn set_status_on_unknown_order_fails() {
        let mut book = OrderBook::new(ME);
        let res = book.set_status(&compute_order_id("x", 0, &[]), OrderStatus::Requested);
        assert!(matches!(res, Err(SwapMeshError::InvalidOrder { .. })));
    }

    #[test]
    fn remote_create_requires_owner_as_author() {
        let mut book = OrderBook::new(ME);
        let order = foreign(BOB, 1);

        assert!(book.insert_remote("12D3KooWMallory", order.clone()).is_err());
        assert!(book.is_empty());

        assert!(book.insert_remote(BOB, order.clone()).unwrap());
        assert!(!book.insert_remote(BOB, order.clone()).unwrap());
        let stored = book.get(&order.id).unwrap();
        assert!(!stored.is_my);
        assert_eq!(stored.owner, BOB);
    }

    #[test]
    fn foreign_removal_rejected() {
        let mut book = OrderBook::new(ME);
        let mine = book.create(draft("1")).unwrap();
        let bobs = foreign(BOB, 1);
        book.insert_remote(BOB, bobs.clone()).unwrap();

        assert!(book.remove_remote(BOB, &mine.id).is_err());
        assert!(book.remove_remote("12D3KooWMallory", &bobs.id).is_err());
        assert_eq!(book.len(), 2);

        assert!(book.remove_remote(BOB, &bobs.id).unwrap());
        assert!(!book.remove_remote(BOB, &bobs.id).unwrap());
    }

    #[test]
    fn remove_before_create_keeps_order_withdrawn() {
        let mut book = OrderBook::new(ME);
        let order = foreign(BOB, 1);

        assert!(!book.remove_remote(BOB, &order.id).unwrap());
        assert!(book.is_withdrawn(&order.id));

        assert!(!book.insert_remote(BOB, order.clone()).unwrap());
        assert!(book.get(&order.id).is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn late_snapshot_does_not_restore_removed_order() {
        let mut book = OrderBook::new(ME);
        let kept = foreign(BOB, 1);
        let withdrawn = foreign(BOB, 2);
        book.insert_remote(BOB, withdrawn.clone()).unwrap();
        assert!(book.remove_remote(BOB, &withdrawn.id).unwrap());

        // Snapshot sent before the removal, delivered after it.
        for order in [kept.clone(), withdrawn.clone()] {
            book.insert_remote(BOB, order).unwrap();
        }
        let ids: Vec<_> = book.items().map(|o| o.id).collect();
        assert_eq!(ids, vec![kept.id]);
    }

    #[test]
    fn early_removal_by_stranger_does_not_block_owner() {
        let mut book = OrderBook::new(ME);
        let order = foreign(BOB, 1);

        assert!(!book.remove_remote("12D3KooWMallory", &order.id).unwrap());
        assert!(book.insert_remote(BOB, order.clone()).unwrap());
        assert!(book.get(&order.id).is_some());
    }

    #[test]
    fn local_removal_is_remembered() {
        let mut book = OrderBook::new(ME);
        let order = foreign(BOB, 1);
        book.insert_remote(BOB, order.clone()).unwrap();

        assert!(book.remove(&order.id).is_some());
        assert!(!book.insert_remote(BOB, order).unwrap());
        assert!(book.is_empty());
    }

    #[test]
    fn pruned_orders_can_return() {
        let mut book = OrderBook::new(ME);
        let order = foreign(BOB, 1);
        book.insert_remote(BOB, order.clone()).unwrap();

        assert_eq!(book.remove_orders_of(BOB), 1);
        assert!(!book.is_withdrawn(&order.id));
        assert!(book.insert_remote(BOB, order).unwrap());
    }

    #[test]
    fn tombstones_are_bounded() {
        let mut book = OrderBook::new(ME);
        let first = compute_order_id(BOB, 0, &[0]);
        book.remove_remote(BOB, &first).unwrap();
        for n in 1..=MAX_TOMBSTONES as u64 {
            book.remove_remote(BOB, &compute_order_id(BOB, 0, &n.to_be_bytes())).unwrap();
        }

        assert!(!book.is_withdrawn(&first));
        assert_eq!(book.tombstones.len(), MAX_TOMBSTONES);
    }

    #[test]
    fn remove_orders_of_spares_own_and_others() {
        let mut book = OrderBook::new(ME);
        book.create(draft("1")).unwrap();
        book.insert_remote(BOB, foreign(BOB, 1)).unwrap();
        book.insert_remote(BOB, foreign(BOB, 2)).unwrap();
        book.insert_remote("carol", foreign("carol", 1)).unwrap();

        assert_eq!(book.remove_orders_of(BOB), 2);
        assert_eq!(book.len(), 2);
        assert_eq!(book.remove_orders_of(ME), 0);
    }
}
