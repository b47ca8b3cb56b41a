//! Relayer control loop.

use super::{RelayError, Relayer};
use crate::{
    config::SolverConfig,
    metrics::RelayerMetrics,
    storage::{SolverStorage, StorageApi},
    types::{
        ChainId, HyperlaneTransfer, OrderStatus, SettlementBatch, SettlementStatus, SubmittedTx,
        TransferStatus, TxType,
    },
};
use alloy::primitives::U256;
use chrono::Utc;
use dashmap::DashSet;
use std::{collections::HashSet, sync::Arc};
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, instrument, warn};

/// Chain and hash of a transaction that dispatched a message.
type Origin = (ChainId, String);

/// Registers transfers for settlement and timeout transactions and drives them through the
/// [`Relayer`].
#[derive(Debug)]
pub struct RelayerRunner {
    config: Arc<SolverConfig>,
    storage: SolverStorage,
    relayer: Relayer,
    /// Origin transactions already registered as transfers by this process.
    registered: DashSet<Origin>,
    metrics: RelayerMetrics,
}

impl RelayerRunner {
    /// Creates a new runner.
    pub fn new(config: Arc<SolverConfig>, storage: SolverStorage, relayer: Relayer) -> Self {
        Self {
            config,
            storage,
            relayer,
            registered: DashSet::new(),
            metrics: RelayerMetrics::default(),
        }
    }

    /// Runs the relayer until `shutdown` fires.
    #[instrument(skip_all, fields(service = "relayer"))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting relayer");
        let mut timer = interval(self.config.relayer.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.changed() => break,
            }

            if let Err(err) = self.run_once().await {
                error!(%err, "Relayer run failed");
            }
        }

        info!("Relayer stopped");
    }

    /// Registers new transfers, then relays every pending one.
    pub async fn run_once(&self) -> Result<(), RelayError> {
        let mut origins = self.register_settlement_transfers().await?;
        origins.extend(self.register_timeout_transfers().await?);
        // settlements and orders that moved on are never registered again
        self.registered.retain(|origin| origins.contains(origin));

        for transfer in self.storage.read_transfers_by_status(TransferStatus::Pending).await? {
            if let Err(err) = self.relay_transfer(&transfer).await {
                warn!(
                    transfer_id = transfer.id,
                    message_id = %transfer.message_id,
                    %err,
                    "Failed to process transfer"
                );
            }
        }

        Ok(())
    }

    /// Registers the messages of initiated settlements, returning their origin transactions.
    async fn register_settlement_transfers(&self) -> Result<HashSet<Origin>, RelayError> {
        let initiated =
            self.storage.read_settlements_by_status(&[SettlementStatus::SettlementInitiated]).await?;

        let mut origins = HashSet::new();
        for batch in SettlementBatch::by_initiate_tx(initiated) {
            let Some(tx_hash) = batch.initiate_settlement_tx() else { continue };
            // settlements are initiated on the chain the orders were filled on
            let origin = (batch.destination_chain_id().clone(), tx_hash.to_string());
            self.register(&origin).await;
            origins.insert(origin);
        }

        Ok(origins)
    }

    /// Registers the messages of timeouts of orders awaiting their refund, returning their
    /// origin transactions.
    async fn register_timeout_transfers(&self) -> Result<HashSet<Origin>, RelayError> {
        let expired = self.storage.read_orders_by_status(OrderStatus::ExpiredPendingRefund).await?;

        let mut origins = HashSet::new();
        for order in expired {
            for tx in self.storage.read_submitted_txs_for_order(order.order_id).await? {
                if tx.tx_type == TxType::Timeout {
                    let origin = (tx.chain_id, tx.tx_hash);
                    self.register(&origin).await;
                    origins.insert(origin);
                }
            }
        }

        Ok(origins)
    }

    /// Registers the message dispatched by the origin transaction as a pending transfer.
    async fn register(&self, origin: &Origin) {
        if self.registered.contains(origin) {
            return;
        }
        let (origin_chain_id, tx_hash) = (origin.0.as_str(), origin.1.as_str());

        let dispatch = match self.relayer.client().dispatch(origin_chain_id, tx_hash).await {
            Ok(dispatch) => dispatch,
            Err(err) => {
                warn!(origin_chain_id, tx_hash, %err, "Failed to read dispatch");
                return;
            }
        };
        let destination = match self.config.chain_by_domain(dispatch.destination_domain) {
            Ok(chain) => chain.chain_id.clone(),
            Err(err) => {
                warn!(origin_chain_id, tx_hash, %err, "Unknown dispatch destination");
                return;
            }
        };

        let transfer = HyperlaneTransfer::pending(
            origin_chain_id.to_string(),
            destination,
            dispatch.message_id,
            tx_hash.to_string(),
        );
        match self.storage.insert_transfer(&transfer).await {
            Ok(inserted) => {
                if inserted {
                    info!(
                        origin_chain_id,
                        tx_hash,
                        message_id = %dispatch.message_id,
                        "Registered transfer"
                    );
                }
                self.registered.insert(origin.clone());
            }
            Err(err) => error!(origin_chain_id, tx_hash, %err, "Failed to store transfer"),
        }
    }

    /// Relays one pending transfer, at most once.
    #[instrument(skip_all, fields(transfer_id = transfer.id, message_id = %transfer.message_id))]
    async fn relay_transfer(&self, transfer: &HyperlaneTransfer) -> Result<(), RelayError> {
        if self
            .relayer
            .client()
            .has_been_delivered(&transfer.destination_chain_id, transfer.message_id)
            .await?
        {
            info!("Transfer delivered");
            self.storage.write_transfer_status(transfer.id, TransferStatus::Success).await?;
            return Ok(());
        }

        if !self.storage.read_submitted_txs_for_transfer(transfer.id).await?.is_empty() {
            debug!("Delivery already submitted");
            return Ok(());
        }

        let max_fee = self.max_fee(transfer);
        match self
            .relayer
            .relay(&transfer.source_chain_id, &transfer.message_sent_tx, max_fee)
            .await
        {
            Ok(relayed) => {
                let tx = SubmittedTx::new(
                    relayed.destination_chain_id,
                    relayed.tx.tx_hash,
                    relayed.tx.raw_tx,
                    TxType::MessageDelivery,
                )
                .with_transfer(transfer.id);
                self.storage.insert_submitted_tx(&tx).await?;
                self.metrics.relays_submitted.increment(1);
            }
            Err(RelayError::MessageAlreadyDelivered(_)) => {
                info!("Transfer delivered");
                self.storage.write_transfer_status(transfer.id, TransferStatus::Success).await?;
            }
            Err(err) if err.is_permanent() => {
                error!(%err, "Abandoning transfer");
                self.storage.write_transfer_status(transfer.id, TransferStatus::Abandoned).await?;
                self.metrics.transfers_abandoned.increment(1);
            }
            Err(err) if err.is_soft() => {
                info!(%err, "Transfer not relayed");
            }
            Err(err) => return Err(err),
        }

        Ok(())
    }

    /// The fee cap for `transfer`, lifted once the transfer waited longer than the configured
    /// profitable relay timeout.
    fn max_fee(&self, transfer: &HyperlaneTransfer) -> Option<U256> {
        let relayer = &self.config.relayer;
        let max = relayer.max_relay_fee_uusdc?;
        let waited = (Utc::now() - transfer.created_at).to_std().unwrap_or_default();
        match relayer.profitable_relay_timeout {
            Some(timeout) if waited > timeout => None,
            _ => Some(max),
        }
    }
}
