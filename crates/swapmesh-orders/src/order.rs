//! Order records.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use swapmesh_types::{Amount, Coin, OrderId, Result, SwapMeshError};

/// Lifecycle of an order. Requested and processing are mutually
/// exclusive, so they share one field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Listed, nobody has asked to take it.
    #[default]
    Idle,
    /// A counterparty asked to take the order.
    Requested,
    /// The swap for this order is running.
    Processing,
}

/// A trade intent: sell `sell_amount` of `sell_coin` for `buy_amount`
/// of `buy_coin`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Base58 peer id of the node that created the order.
    pub owner: String,
    pub sell_coin: Coin,
    pub buy_coin: Coin,
    pub sell_amount: Amount,
    pub buy_amount: Amount,
    /// Created by this node.
    pub is_my: bool,
    pub status: OrderStatus,
}

impl Order {
    pub fn is_requested(&self) -> bool {
        self.status == OrderStatus::Requested
    }

    pub fn is_processing(&self) -> bool {
        self.status == OrderStatus::Processing
    }
}

/// Caller input for a new order. The book fills in the id, owner and
/// status.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub sell_coin: Coin,
    pub buy_coin: Coin,
    pub sell_amount: Amount,
    pub buy_amount: Amount,
}

impl OrderDraft {
    /// Rejects drafts that trade a coin for itself.
    pub fn validate(&self) -> Result<()> {
        if self.sell_coin == self.buy_coin {
            return Err(SwapMeshError::InvalidOrder {
                reason: format!("cannot trade {} for itself", self.sell_coin),
            });
        }
        Ok(())
    }
}

/// `SHA3-256(owner || created_at_ms (big-endian) || nonce)`.
pub fn compute_order_id(owner: &str, created_at_ms: i64, nonce: &[u8]) -> OrderId {
    let mut hasher = Sha3_256::new();
    hasher.update(owner.as_bytes());
    hasher.update(created_at_ms.to_be_bytes());
    hasher.update(nonce);
    OrderId::new(hasher.finalize().into())
}

/// A fresh id for an order created now by `owner`.
pub fn new_order_id(owner: &str) -> OrderId {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    compute_order_id(owner, chrono::Utc::now().timestamp_millis(), &nonce)
}
