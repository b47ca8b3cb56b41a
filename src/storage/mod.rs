//! Solver storage

mod api;
pub use api::{Result, StorageApi};
mod error;
pub use error::StorageError;
mod memory;
pub use memory::InMemoryStorage;
mod pg;
pub use pg::PgStorage;

use crate::types::{
    HyperlaneTransfer, Order, OrderSettlement, OrderStatus, SettlementBatch, SettlementStatus,
    SubmittedTx, TransferStatus, TxStatus,
};
use alloy::primitives::B256;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Solver storage interface.
#[derive(Debug, Clone)]
pub struct SolverStorage {
    inner: Arc<dyn StorageApi>,
}

impl SolverStorage {
    /// Create [`SolverStorage`] with a in-memory backend. Used for testing and local runs only.
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(InMemoryStorage::default()) }
    }

    /// Create [`SolverStorage`] with a PostgreSQL backend.
    pub fn pg(pool: PgPool) -> Self {
        Self { inner: Arc::new(PgStorage::new(pool)) }
    }
}

#[async_trait]
impl StorageApi for SolverStorage {
    async fn insert_order(&self, order: &Order) -> Result<bool> {
        self.inner.insert_order(order).await
    }

    async fn read_order(&self, order_id: B256) -> Result<Option<Order>> {
        self.inner.read_order(order_id).await
    }

    async fn read_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.inner.read_orders_by_status(status).await
    }

    async fn write_order_status(&self, order_id: B256, status: OrderStatus) -> Result<()> {
        self.inner.write_order_status(order_id, status).await
    }

    async fn write_order_fill(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        self.inner.write_order_fill(order_id, tx).await
    }

    async fn write_order_timeout(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        self.inner.write_order_timeout(order_id, tx).await
    }

    async fn insert_settlement(&self, settlement: &OrderSettlement) -> Result<bool> {
        self.inner.insert_settlement(settlement).await
    }

    async fn read_settlements_by_status(
        &self,
        statuses: &[SettlementStatus],
    ) -> Result<Vec<OrderSettlement>> {
        self.inner.read_settlements_by_status(statuses).await
    }

    async fn write_settlement_initiation(
        &self,
        batch: &SettlementBatch,
        tx: &SubmittedTx,
    ) -> Result<()> {
        self.inner.write_settlement_initiation(batch, tx).await
    }

    async fn advance_settlement_status(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        message: Option<String>,
    ) -> Result<bool> {
        self.inner.advance_settlement_status(settlement_id, status, message).await
    }

    async fn insert_transfer(&self, transfer: &HyperlaneTransfer) -> Result<bool> {
        self.inner.insert_transfer(transfer).await
    }

    async fn read_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<HyperlaneTransfer>> {
        self.inner.read_transfers_by_status(status).await
    }

    async fn write_transfer_status(
        &self,
        transfer_id: i64,
        status: TransferStatus,
    ) -> Result<bool> {
        self.inner.write_transfer_status(transfer_id, status).await
    }

    async fn insert_submitted_tx(&self, tx: &SubmittedTx) -> Result<i64> {
        self.inner.insert_submitted_tx(tx).await
    }

    async fn read_submitted_txs_for_order(&self, order_id: B256) -> Result<Vec<SubmittedTx>> {
        self.inner.read_submitted_txs_for_order(order_id).await
    }

    async fn read_submitted_txs_for_transfer(&self, transfer_id: i64) -> Result<Vec<SubmittedTx>> {
        self.inner.read_submitted_txs_for_transfer(transfer_id).await
    }

    async fn write_submitted_tx_status(
        &self,
        chain_id: &str,
        tx_hash: &str,
        status: TxStatus,
        message: Option<String>,
    ) -> Result<()> {
        self.inner.write_submitted_tx_status(chain_id, tx_hash, status, message).await
    }
}
