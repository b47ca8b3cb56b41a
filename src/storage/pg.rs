//! Solver storage implementation using a PostgreSQL database.

use super::{StorageApi, StorageError, api::Result};
use crate::types::{
    HyperlaneTransfer, Order, OrderSettlement, OrderStatus, SettlementBatch, SettlementStatus,
    SubmittedTx, TransferStatus, TxStatus,
};
use alloy::primitives::{B256, Bytes, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use std::str::FromStr;
use tracing::instrument;

/// PostgreSQL storage implementation.
#[derive(Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Creates a new PostgreSQL storage instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a submitted transaction within an existing database transaction.
    async fn insert_submitted_tx_with(
        &self,
        tx: &SubmittedTx,
        db_tx: &mut sqlx::Transaction<'static, Postgres>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO submitted_txs (
                chain_id, tx_hash, raw_tx, tx_type, tx_status, tx_status_message,
                order_id, order_settlement_id, hyperlane_transfer_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&tx.chain_id)
        .bind(tx.tx_hash.as_str())
        .bind(&tx.raw_tx[..])
        .bind(tx.tx_type.to_string())
        .bind(tx.tx_status.to_string())
        .bind(tx.tx_status_message.as_deref())
        .bind(tx.order_id.as_ref().map(|id| id.as_slice()))
        .bind(tx.order_settlement_id)
        .bind(tx.hyperlane_transfer_id)
        .bind(tx.created_at)
        .fetch_one(&mut **db_tx)
        .await?;

        Ok(row.try_get("id")?)
    }
}

fn parse_column<T: FromStr>(column: &'static str, value: String) -> Result<T> {
    value.parse().map_err(|_| StorageError::InvalidColumn { column, value })
}

fn b256_column(column: &'static str, bytes: Vec<u8>) -> Result<B256> {
    if bytes.len() != 32 {
        return Err(StorageError::InvalidColumn { column, value: Bytes::from(bytes).to_string() });
    }
    Ok(B256::from_slice(&bytes))
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        order_id: b256_column("order_id", row.try_get("order_id")?)?,
        source_chain_id: row.try_get("source_chain_id")?,
        destination_chain_id: row.try_get("destination_chain_id")?,
        source_chain_gateway: row.try_get("source_chain_gateway")?,
        sender: Bytes::from(row.try_get::<Vec<u8>, _>("sender")?),
        recipient: Bytes::from(row.try_get::<Vec<u8>, _>("recipient")?),
        amount_in: parse_column::<U256>("amount_in", row.try_get("amount_in")?)?,
        amount_out: parse_column::<U256>("amount_out", row.try_get("amount_out")?)?,
        nonce: row.try_get::<i64, _>("nonce")? as u32,
        timeout_timestamp: row.try_get::<DateTime<Utc>, _>("timeout_timestamp")?,
        order_creation_tx: row.try_get("order_creation_tx")?,
        order_creation_tx_block_height: row.try_get::<i64, _>("order_creation_tx_block_height")?
            as u64,
        data: row.try_get::<Option<Vec<u8>>, _>("data")?.map(Bytes::from),
        status: parse_column("order_status", row.try_get("order_status")?)?,
        fill_tx: row.try_get("fill_tx")?,
        refund_tx: row.try_get("refund_tx")?,
    })
}

fn settlement_from_row(row: &PgRow) -> Result<OrderSettlement> {
    Ok(OrderSettlement {
        id: row.try_get("id")?,
        source_chain_id: row.try_get("source_chain_id")?,
        destination_chain_id: row.try_get("destination_chain_id")?,
        source_chain_gateway: row.try_get("source_chain_gateway")?,
        order_id: b256_column("order_id", row.try_get("order_id")?)?,
        amount: parse_column::<U256>("amount", row.try_get("amount")?)?,
        initiate_settlement_tx: row.try_get("initiate_settlement_tx")?,
        complete_settlement_tx: row.try_get("complete_settlement_tx")?,
        status: parse_column("settlement_status", row.try_get("settlement_status")?)?,
        status_message: row.try_get("settlement_status_message")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<HyperlaneTransfer> {
    Ok(HyperlaneTransfer {
        id: row.try_get("id")?,
        source_chain_id: row.try_get("source_chain_id")?,
        destination_chain_id: row.try_get("destination_chain_id")?,
        message_id: b256_column("message_id", row.try_get("message_id")?)?,
        message_sent_tx: row.try_get("message_sent_tx")?,
        status: parse_column("transfer_status", row.try_get("transfer_status")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn submitted_tx_from_row(row: &PgRow) -> Result<SubmittedTx> {
    Ok(SubmittedTx {
        id: row.try_get("id")?,
        chain_id: row.try_get("chain_id")?,
        tx_hash: row.try_get("tx_hash")?,
        raw_tx: Bytes::from(row.try_get::<Vec<u8>, _>("raw_tx")?),
        tx_type: parse_column("tx_type", row.try_get("tx_type")?)?,
        tx_status: parse_column("tx_status", row.try_get("tx_status")?)?,
        tx_status_message: row.try_get("tx_status_message")?,
        order_id: row
            .try_get::<Option<Vec<u8>>, _>("order_id")?
            .map(|id| b256_column("order_id", id))
            .transpose()?,
        order_settlement_id: row.try_get("order_settlement_id")?,
        hyperlane_transfer_id: row.try_get("hyperlane_transfer_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl StorageApi for PgStorage {
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, source_chain_id, destination_chain_id, source_chain_gateway, sender,
                recipient, amount_in, amount_out, nonce, timeout_timestamp, order_creation_tx,
                order_creation_tx_block_height, data, order_status, fill_tx, refund_tx
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order.order_id.as_slice())
        .bind(&order.source_chain_id)
        .bind(&order.destination_chain_id)
        .bind(&order.source_chain_gateway)
        .bind(&order.sender[..])
        .bind(&order.recipient[..])
        .bind(order.amount_in.to_string())
        .bind(order.amount_out.to_string())
        .bind(order.nonce as i64)
        .bind(order.timeout_timestamp)
        .bind(&order.order_creation_tx)
        .bind(order.order_creation_tx_block_height as i64)
        .bind(order.data.as_ref().map(|data| data.to_vec()))
        .bind(order.status.to_string())
        .bind(order.fill_tx.as_deref())
        .bind(order.refund_tx.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn read_order(&self, order_id: B256) -> Result<Option<Order>> {
        sqlx::query("select * from orders where order_id = $1")
            .bind(order_id.as_slice())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(order_from_row)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn read_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query("select * from orders where order_status = $1 order by created_at")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn write_order_status(&self, order_id: B256, status: OrderStatus) -> Result<()> {
        let result = sqlx::query(
            "update orders set order_status = $1, updated_at = now() where order_id = $2",
        )
        .bind(status.to_string())
        .bind(order_id.as_slice())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("order {order_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, tx))]
    async fn write_order_fill(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET fill_tx = $1, order_status = $2, updated_at = now()
            WHERE order_id = $3
            "#,
        )
        .bind(tx.tx_hash.as_str())
        .bind(OrderStatus::Filled.to_string())
        .bind(order_id.as_slice())
        .execute(&mut *db_tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("order {order_id}")));
        }
        self.insert_submitted_tx_with(tx, &mut db_tx).await?;

        db_tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, tx))]
    async fn write_order_timeout(&self, order_id: B256, tx: &SubmittedTx) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        let result =
            sqlx::query("update orders set refund_tx = $1, updated_at = now() where order_id = $2")
                .bind(tx.tx_hash.as_str())
                .bind(order_id.as_slice())
                .execute(&mut *db_tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("order {order_id}")));
        }
        self.insert_submitted_tx_with(tx, &mut db_tx).await?;

        db_tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %settlement.order_id))]
    async fn insert_settlement(&self, settlement: &OrderSettlement) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_settlements (
                source_chain_id, destination_chain_id, source_chain_gateway, order_id, amount,
                initiate_settlement_tx, complete_settlement_tx, settlement_status,
                settlement_status_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_chain_id, destination_chain_id, source_chain_gateway, order_id)
            DO NOTHING
            "#,
        )
        .bind(&settlement.source_chain_id)
        .bind(&settlement.destination_chain_id)
        .bind(&settlement.source_chain_gateway)
        .bind(settlement.order_id.as_slice())
        .bind(settlement.amount.to_string())
        .bind(settlement.initiate_settlement_tx.as_deref())
        .bind(settlement.complete_settlement_tx.as_deref())
        .bind(settlement.status.to_string())
        .bind(settlement.status_message.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn read_settlements_by_status(
        &self,
        statuses: &[SettlementStatus],
    ) -> Result<Vec<OrderSettlement>> {
        let statuses = statuses.iter().map(ToString::to_string).collect::<Vec<_>>();
        let rows = sqlx::query(
            "select * from order_settlements where settlement_status = any($1) order by id",
        )
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(settlement_from_row).collect()
    }

    #[instrument(skip_all, fields(tx_hash = %tx.tx_hash, settlements = batch.len()))]
    async fn write_settlement_initiation(
        &self,
        batch: &SettlementBatch,
        tx: &SubmittedTx,
    ) -> Result<()> {
        let ids = batch.settlements().iter().map(|s| s.id).collect::<Vec<_>>();
        let mut db_tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE order_settlements
            SET initiate_settlement_tx = $1, updated_at = now()
            WHERE id = any($2) AND initiate_settlement_tx IS NULL
            "#,
        )
        .bind(tx.tx_hash.as_str())
        .bind(&ids)
        .execute(&mut *db_tx)
        .await?;
        if result.rows_affected() != ids.len() as u64 {
            // dropping the transaction rolls back the partial update
            return Err(StorageError::AlreadyRecorded(format!(
                "initiation of settlements {ids:?}"
            )));
        }

        let tx = SubmittedTx { order_settlement_id: Some(batch.first().id), ..tx.clone() };
        self.insert_submitted_tx_with(&tx, &mut db_tx).await?;

        db_tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn advance_settlement_status(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        message: Option<String>,
    ) -> Result<bool> {
        let predecessors =
            status.predecessors().iter().map(ToString::to_string).collect::<Vec<_>>();
        let result = sqlx::query(
            r#"
            UPDATE order_settlements
            SET settlement_status = $1,
                settlement_status_message = coalesce($2, settlement_status_message),
                updated_at = now()
            WHERE id = $3 AND settlement_status = any($4)
            "#,
        )
        .bind(status.to_string())
        .bind(message)
        .bind(settlement_id)
        .bind(predecessors)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(message_id = %transfer.message_id))]
    async fn insert_transfer(&self, transfer: &HyperlaneTransfer) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO hyperlane_transfers (
                source_chain_id, destination_chain_id, message_id, message_sent_tx,
                transfer_status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_chain_id, message_id) DO NOTHING
            "#,
        )
        .bind(&transfer.source_chain_id)
        .bind(&transfer.destination_chain_id)
        .bind(transfer.message_id.as_slice())
        .bind(&transfer.message_sent_tx)
        .bind(transfer.status.to_string())
        .bind(transfer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn read_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<HyperlaneTransfer>> {
        let rows =
            sqlx::query("select * from hyperlane_transfers where transfer_status = $1 order by id")
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(transfer_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn write_transfer_status(
        &self,
        transfer_id: i64,
        status: TransferStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE hyperlane_transfers
            SET transfer_status = $1, updated_at = now()
            WHERE id = $2 AND transfer_status = $3
            "#,
        )
        .bind(status.to_string())
        .bind(transfer_id)
        .bind(TransferStatus::Pending.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(tx_hash = %tx.tx_hash))]
    async fn insert_submitted_tx(&self, tx: &SubmittedTx) -> Result<i64> {
        let mut db_tx = self.pool.begin().await?;
        let id = self.insert_submitted_tx_with(tx, &mut db_tx).await?;
        db_tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn read_submitted_txs_for_order(&self, order_id: B256) -> Result<Vec<SubmittedTx>> {
        let rows = sqlx::query("select * from submitted_txs where order_id = $1 order by id")
            .bind(order_id.as_slice())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(submitted_tx_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn read_submitted_txs_for_transfer(&self, transfer_id: i64) -> Result<Vec<SubmittedTx>> {
        let rows =
            sqlx::query("select * from submitted_txs where hyperlane_transfer_id = $1 order by id")
                .bind(transfer_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(submitted_tx_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn write_submitted_tx_status(
        &self,
        chain_id: &str,
        tx_hash: &str,
        status: TxStatus,
        message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE submitted_txs
            SET tx_status = $1, tx_status_message = $2, updated_at = now()
            WHERE chain_id = $3 AND tx_hash = $4
            "#,
        )
        .bind(status.to_string())
        .bind(message)
        .bind(chain_id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
