//! Solver storage implementation in-memory. For testing and local runs only.

use super::{StorageApi, StorageError, api::Result};
use crate::types::{
    HyperlaneTransfer, Order, OrderSettlement, OrderStatus, SettlementBatch, SettlementKey,
    SettlementStatus, SubmittedTx, TransferStatus, TxStatus,
};
use alloy::primitives::B256;
use async_trait::async_trait;
use dashmap::{DashMap, Entry};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Records that are written together and therefore share one lock.
#[derive(Debug, Default)]
struct Tables {
    settlements: BTreeMap<i64, OrderSettlement>,
    settlement_keys: HashMap<SettlementKey, i64>,
    transfers: BTreeMap<i64, HyperlaneTransfer>,
    transfer_keys: HashMap<(String, B256), i64>,
    submitted_txs: BTreeMap<i64, SubmittedTx>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_submitted_tx(&mut self, tx: &SubmittedTx) -> i64 {
        let id = self.next_id();
        self.submitted_txs.insert(id, SubmittedTx { id, ..tx.clone() });
        id
    }
}

/// [`StorageApi`] implementation in-memory.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    orders: DashMap<B256, Order>,
    tables: RwLock<Tables>,
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn insert_order(&self, order: &Order) -> Result<bool> {
        match self.orders.entry(order.order_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(order.clone());
                Ok(true)
            }
        }
    }

    async fn read_order(&self, order_id: B256) -> Result<Option<Order>> {
        Ok(self.orders.get(&order_id).map(|order| order.clone()))
    }

    async fn read_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .iter()
            .filter(|order| order.status == status)
            .map(|order| order.clone())
            .collect())
    }

    async fn write_order_status(&self, order_id: B256, status: OrderStatus) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StorageError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        Ok(())
    }

    async fn write_order_fill(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StorageError::NotFound(format!("order {order_id}")))?;
        tables.insert_submitted_tx(tx);
        order.fill_tx = Some(tx.tx_hash.clone());
        order.status = OrderStatus::Filled;
        Ok(())
    }

    async fn write_order_timeout(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StorageError::NotFound(format!("order {order_id}")))?;
        tables.insert_submitted_tx(tx);
        order.refund_tx = Some(tx.tx_hash.clone());
        Ok(())
    }

    async fn insert_settlement(&self, settlement: &OrderSettlement) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let key = settlement.key();
        if tables.settlement_keys.contains_key(&key) {
            return Ok(false);
        }
        let id = tables.next_id();
        tables.settlement_keys.insert(key, id);
        tables.settlements.insert(id, OrderSettlement { id, ..settlement.clone() });
        Ok(true)
    }

    async fn read_settlements_by_status(
        &self,
        statuses: &[SettlementStatus],
    ) -> Result<Vec<OrderSettlement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .settlements
            .values()
            .filter(|settlement| statuses.contains(&settlement.status))
            .cloned()
            .collect())
    }

    async fn write_settlement_initiation(
        &self,
        batch: &SettlementBatch,
        tx: &SubmittedTx,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        // validate the whole batch first so that a failure leaves no partial writes behind
        for member in batch.settlements() {
            match tables.settlements.get(&member.id) {
                None => return Err(StorageError::NotFound(format!("settlement {}", member.id))),
                Some(settlement) if settlement.initiate_settlement_tx.is_some() => {
                    return Err(StorageError::AlreadyRecorded(format!(
                        "initiation of settlement {}",
                        member.id
                    )));
                }
                Some(_) => {}
            }
        }

        for member in batch.settlements() {
            if let Some(settlement) = tables.settlements.get_mut(&member.id) {
                settlement.initiate_settlement_tx = Some(tx.tx_hash.clone());
            }
        }
        tables.insert_submitted_tx(&SubmittedTx {
            order_settlement_id: Some(batch.first().id),
            ..tx.clone()
        });

        Ok(())
    }

    async fn advance_settlement_status(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        message: Option<String>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let settlement = tables
            .settlements
            .get_mut(&settlement_id)
            .ok_or_else(|| StorageError::NotFound(format!("settlement {settlement_id}")))?;

        if !settlement.status.can_advance_to(status) {
            return Ok(false);
        }
        settlement.status = status;
        if message.is_some() {
            settlement.status_message = message;
        }
        Ok(true)
    }

    async fn insert_transfer(&self, transfer: &HyperlaneTransfer) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let key = (transfer.source_chain_id.clone(), transfer.message_id);
        if tables.transfer_keys.contains_key(&key) {
            return Ok(false);
        }
        let id = tables.next_id();
        tables.transfer_keys.insert(key, id);
        tables.transfers.insert(id, HyperlaneTransfer { id, ..transfer.clone() });
        Ok(true)
    }

    async fn read_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<HyperlaneTransfer>> {
        let tables = self.tables.read().await;
        Ok(tables.transfers.values().filter(|t| t.status == status).cloned().collect())
    }

    async fn write_transfer_status(
        &self,
        transfer_id: i64,
        status: TransferStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let transfer = tables
            .transfers
            .get_mut(&transfer_id)
            .ok_or_else(|| StorageError::NotFound(format!("transfer {transfer_id}")))?;

        if transfer.status != TransferStatus::Pending {
            return Ok(false);
        }
        transfer.status = status;
        Ok(true)
    }

    async fn insert_submitted_tx(&self, tx: &SubmittedTx) -> Result<i64> {
        Ok(self.tables.write().await.insert_submitted_tx(tx))
    }

    async fn read_submitted_txs_for_order(&self, order_id: B256) -> Result<Vec<SubmittedTx>> {
        let tables = self.tables.read().await;
        Ok(tables.submitted_txs.values().filter(|tx| tx.order_id == Some(order_id)).cloned().collect())
    }

    async fn read_submitted_txs_for_transfer(&self, transfer_id: i64) -> Result<Vec<SubmittedTx>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submitted_txs
            .values()
            .filter(|tx| tx.hyperlane_transfer_id == Some(transfer_id))
            .cloned()
            .collect())
    }

    async fn write_submitted_tx_status(
        &self,
        chain_id: &str,
        tx_hash: &str,
        status: TxStatus,
        message: Option<String>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        for tx in tables
            .submitted_txs
            .values_mut()
            .filter(|tx| tx.chain_id == chain_id && tx.tx_hash == tx_hash)
        {
            tx.tx_status = status;
            tx.tx_status_message.clone_from(&message);
        }
        Ok(())
    }
}
