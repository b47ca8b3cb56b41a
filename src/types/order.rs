use super::ChainId;
use alloy::primitives::{B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of an [`Order`] as tracked by the solver.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order was observed on the source chain and is waiting to be filled.
    #[default]
    Pending,
    /// A fill transaction was submitted for the order.
    Filled,
    /// The order timed out unfilled and its funds must be refunded to the user.
    ExpiredPendingRefund,
    /// The source gateway refunded the order.
    Refunded,
    /// The solver gave up on the order.
    Abandoned,
}

/// A user intent to move value from a source chain to a destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Content-derived order id.
    pub order_id: B256,
    /// Chain the order was submitted on.
    pub source_chain_id: ChainId,
    /// Chain the order must be filled on.
    pub destination_chain_id: ChainId,
    /// Gateway contract on the source chain that escrows the order funds.
    pub source_chain_gateway: String,
    /// Chain-native sender address.
    pub sender: Bytes,
    /// Chain-native recipient address.
    pub recipient: Bytes,
    /// Amount escrowed on the source chain.
    pub amount_in: U256,
    /// Amount the recipient receives on the destination chain.
    pub amount_out: U256,
    /// Order nonce.
    pub nonce: u32,
    /// Unix timestamp after which the order can no longer be filled.
    pub timeout_timestamp: DateTime<Utc>,
    /// Hash of the transaction that created the order.
    pub order_creation_tx: String,
    /// Block height of the creation transaction.
    pub order_creation_tx_block_height: u64,
    /// Optional opaque payload forwarded to the recipient.
    pub data: Option<Bytes>,
    /// Current order status.
    pub status: OrderStatus,
    /// Hash of the fill transaction, once submitted.
    pub fill_tx: Option<String>,
    /// Hash of the timeout transaction, once submitted.
    pub refund_tx: Option<String>,
}

impl Order {
    /// Returns true if the order can no longer be filled at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.timeout_timestamp
    }
}

/// Status of an order as reported by a fast transfer gateway contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OnChainOrderStatus {
    /// Not filled (on the destination) or not yet settled (on the source).
    Unfilled,
    /// Filled (on the destination) or settled (on the source).
    Filled,
    /// Refunded after a timeout.
    Refunded,
}

/// A fill observed on the chain an order was filled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    /// The filled order.
    pub order_id: B256,
    /// Hyperlane domain of the chain the order was submitted on.
    pub source_domain: u32,
    /// Address of the filler.
    pub filler: String,
    /// Hash of the fill transaction.
    pub tx_hash: String,
}
