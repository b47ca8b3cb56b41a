//! Solver storage api.

use super::StorageError;
use crate::types::{
    HyperlaneTransfer, Order, OrderSettlement, OrderStatus, SettlementBatch, SettlementStatus,
    SubmittedTx, TransferStatus, TxStatus,
};
use alloy::primitives::B256;
use async_trait::async_trait;
use std::fmt::Debug;

/// Type alias for `Result<T, StorageError>`
pub type Result<T> = core::result::Result<T, StorageError>;

/// Storage API.
///
/// Inserts of records with a uniqueness key are idempotent: inserting a duplicate is a no-op that
/// reports `false`. Status writes only ever advance a record, a write that would regress it is
/// ignored and reported as `false`.
#[async_trait]
pub trait StorageApi: Debug + Send + Sync {
    /// Inserts an order. Returns false if an order with the same id already exists.
    async fn insert_order(&self, order: &Order) -> Result<bool>;

    /// Reads an order by id.
    async fn read_order(&self, order_id: B256) -> Result<Option<Order>>;

    /// Reads all orders in the given status.
    async fn read_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Sets the status of an order.
    async fn write_order_status(&self, order_id: B256, status: OrderStatus) -> Result<()>;

    /// Records a fill: stores the audit row, stamps the fill tx on the order and marks it
    /// [`OrderStatus::Filled`], atomically.
    async fn write_order_fill(&self, order_id: B256, tx: &SubmittedTx) -> Result<()>;

    /// Records a timeout: stores the audit row and stamps the refund tx on the order, atomically.
    async fn write_order_timeout(&self, order_id: B256, tx: &SubmittedTx) -> Result<()>;

    /// Inserts a settlement. Returns false if one with the same
    /// (source chain, destination chain, gateway, order id) already exists.
    async fn insert_settlement(&self, settlement: &OrderSettlement) -> Result<bool>;

    /// Reads all settlements in any of the given statuses.
    async fn read_settlements_by_status(
        &self,
        statuses: &[SettlementStatus],
    ) -> Result<Vec<OrderSettlement>>;

    /// Stamps `tx` as the initiate settlement transaction of every batch member and stores the
    /// audit row linked to the first member, atomically.
    async fn write_settlement_initiation(
        &self,
        batch: &SettlementBatch,
        tx: &SubmittedTx,
    ) -> Result<()>;

    /// Moves a settlement to `status` if its current status allows it.
    ///
    /// Returns true if the settlement was updated.
    async fn advance_settlement_status(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        message: Option<String>,
    ) -> Result<bool>;

    /// Inserts a transfer. Returns false if one with the same (source chain, message id) exists.
    async fn insert_transfer(&self, transfer: &HyperlaneTransfer) -> Result<bool>;

    /// Reads all transfers in the given status.
    async fn read_transfers_by_status(&self, status: TransferStatus)
    -> Result<Vec<HyperlaneTransfer>>;

    /// Moves a pending transfer to `status`. Returns true if the transfer was updated.
    async fn write_transfer_status(&self, transfer_id: i64, status: TransferStatus)
    -> Result<bool>;

    /// Inserts a submitted transaction audit row, returning its id.
    async fn insert_submitted_tx(&self, tx: &SubmittedTx) -> Result<i64>;

    /// Reads submitted transactions linked to an order.
    async fn read_submitted_txs_for_order(&self, order_id: B256) -> Result<Vec<SubmittedTx>>;

    /// Reads submitted transactions linked to a transfer.
    async fn read_submitted_txs_for_transfer(&self, transfer_id: i64) -> Result<Vec<SubmittedTx>>;

    /// Sets the status of every submitted transaction with the given hash on `chain_id`.
    async fn write_submitted_tx_status(
        &self,
        chain_id: &str,
        tx_hash: &str,
        status: TxStatus,
        message: Option<String>,
    ) -> Result<()>;
}
