use super::ChainId;
use alloy::primitives::{B256, Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of a transaction submitted by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    /// Order fill on the destination chain.
    Fill,
    /// Batch settlement initiation on the destination chain.
    Settlement,
    /// Timeout initiation for an expired order.
    Timeout,
    /// Hyperlane message delivery.
    MessageDelivery,
}

/// Observed status of a submitted transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Broadcast, outcome unknown.
    #[default]
    Pending,
    /// Included and succeeded.
    Success,
    /// Included and failed.
    Failed,
}

/// Audit record of a transaction submitted by the solver.
///
/// Several settlements can share one physical transaction; the record links to the first of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTx {
    /// Storage id. Zero until the record is persisted.
    pub id: i64,
    /// Chain the transaction was sent to.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub tx_hash: String,
    /// Raw signed transaction bytes.
    pub raw_tx: Bytes,
    /// Kind of transaction.
    pub tx_type: TxType,
    /// Status of the transaction.
    pub tx_status: TxStatus,
    /// Failure reason, if any.
    pub tx_status_message: Option<String>,
    /// Linked order, if any.
    pub order_id: Option<B256>,
    /// Linked settlement, if any.
    pub order_settlement_id: Option<i64>,
    /// Linked Hyperlane transfer, if any.
    pub hyperlane_transfer_id: Option<i64>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl SubmittedTx {
    /// Creates a new pending record.
    pub fn new(chain_id: ChainId, tx_hash: String, raw_tx: Bytes, tx_type: TxType) -> Self {
        Self {
            id: 0,
            chain_id,
            tx_hash,
            raw_tx,
            tx_type,
            tx_status: TxStatus::Pending,
            tx_status_message: None,
            order_id: None,
            order_settlement_id: None,
            hyperlane_transfer_id: None,
            created_at: Utc::now(),
        }
    }

    /// Links the record to an order.
    pub fn with_order(mut self, order_id: B256) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Links the record to a settlement.
    pub fn with_settlement(mut self, settlement_id: i64) -> Self {
        self.order_settlement_id = Some(settlement_id);
        self
    }

    /// Links the record to a Hyperlane transfer.
    pub fn with_transfer(mut self, transfer_id: i64) -> Self {
        self.hyperlane_transfer_id = Some(transfer_id);
        self
    }
}
