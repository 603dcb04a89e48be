//! Order gossip messages.
//!
//! JSON, internally tagged by `"type"`:
//!
//! ```json
//! {"type":"create","id":"<hex>","owner":"12D3…","sell_coin":"BTC","buy_coin":"ETH","sell_amount":"0.1","buy_amount":"2"}
//! {"type":"remove","id":"<hex>","owner":"12D3…"}
//! {"type":"snapshot","orders":[{…}, …]}
//! ```

use serde::{Deserialize, Serialize};

use swapmesh_types::{Amount, Coin, OrderId, Result, SwapMeshError};

use crate::order::{Order, OrderStatus};

/// The publicly shared part of an order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WireOrder {
    pub id: OrderId,
    pub owner: String,
    pub sell_coin: Coin,
    pub buy_coin: Coin,
    pub sell_amount: Amount,
    pub buy_amount: Amount,
}

impl From<&Order> for WireOrder {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            owner: order.owner.clone(),
            sell_coin: order.sell_coin,
            buy_coin: order.buy_coin,
            sell_amount: order.sell_amount.clone(),
            buy_amount: order.buy_amount.clone(),
        }
    }
}

impl WireOrder {
    /// A received order: foreign and idle.
    pub fn into_foreign_order(self) -> Order {
        Order {
            id: self.id,
            owner: self.owner,
            sell_coin: self.sell_coin,
            buy_coin: self.buy_coin,
            sell_amount: self.sell_amount,
            buy_amount: self.buy_amount,
            is_my: false,
            status: OrderStatus::Idle,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderMessage {
    Create(WireOrder),
    Remove { id: OrderId, owner: String },
    /// Every order the sender owns, re-announced for newly joined peers.
    Snapshot { orders: Vec<WireOrder> },
}

impl OrderMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SwapMeshError::ProtocolError {
            reason: format!("failed to encode order message: {e}"),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SwapMeshError::ProtocolError {
            reason: format!("malformed order message: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn create_layout_is_flat_and_tagged() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let msg = OrderMessage::Create(WireOrder {
            id: ID.parse()?,
            owner: "peer".into(),
            sell_coin: Coin::Btc,
            buy_coin: Coin::Eth,
            sell_amount: "0.1".parse()?,
            buy_amount: "2".parse()?,
        });

        let value: serde_json::Value = serde_json::from_slice(&msg.encode()?)?;
        assert_eq!(value["type"], "create");
        assert_eq!(value["id"], ID);
        assert_eq!(value["sell_coin"], "BTC");
        assert_eq!(value["buy_amount"], "2");
        Ok(())
    }

    #[test]
    fn remove_decodes_from_json() -> std::result::Result<(), SwapMeshError> {
        let json = format!(r#"{{"type":"remove","id":"{ID}","owner":"peer"}}"#);
        let msg = OrderMessage::decode(json.as_bytes())?;
        assert_eq!(
            msg,
            OrderMessage::Remove {
                id: ID.parse()?,
                owner: "peer".into()
            }
        );
        Ok(())
    }

    #[test]
    fn malformed_payloads_rejected() {
        let payloads: [&[u8]; 5] = [
            b"not json",
            br#"{"type":"explode"}"#,
            br#"{"type":"remove","id":"zz","owner":"peer"}"#,
            br#"{"type":"create","id":"aa","owner":"p","sell_coin":"BTC","buy_coin":"ETH","sell_amount":"1","buy_amount":"1"}"#,
            br#"{"type":"snapshot"}"#,
        ];
        for bad in payloads {
            assert!(matches!(
                OrderMessage::decode(bad),
                Err(SwapMeshError::ProtocolError { .. })
            ));
        }
    }

    #[test]
    fn negative_amount_rejected_on_decode() {
        let json = format!(
            r#"{{"type":"create","id":"{ID}","owner":"p","sell_coin":"BTC","buy_coin":"ETH","sell_amount":"-1","buy_amount":"1"}}"#
        );
        assert!(OrderMessage::decode(json.as_bytes()).is_err());
    }

    #[test]
    fn received_order_is_foreign_and_idle() -> std::result::Result<(), SwapMeshError> {
        let order = WireOrder {
            id: ID.parse()?,
            owner: "peer".into(),
            sell_coin: Coin::Ghost,
            buy_coin: Coin::Next,
            sell_amount: "5".parse()?,
            buy_amount: "7".parse()?,
        }
        .into_foreign_order();
        assert!(!order.is_my);
        assert_eq!(order.status, OrderStatus::Idle);
        Ok(())
    }
}
