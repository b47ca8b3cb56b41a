//! Settlement engine.
//!
//! Every tick runs three phases, in order:
//!
//! 1. Discover: filled orders that are not settled on their source chain are stored as pending
//!    settlements.
//! 2. Settle: pending settlements are batched by chain pair, and every batch whose value reaches
//!    the settle up threshold of its source chain is settled with one transaction.
//! 3. Verify: initiated settlements are advanced from the outcome of their settlement
//!    transaction and the settlement state on the source chain.

use super::{SettlementDetector, SettlementError};
use crate::{
    chains::{ChainClients, SettlementRequest, contracts::left_pad_word},
    config::SolverConfig,
    metrics::{SettlementMetrics, TransactionMetrics},
    storage::{SolverStorage, StorageApi},
    types::{
        OrderSettlement, OrderStatus, SettlementBatch, SettlementStatus, SubmittedTx, TxStatus,
        TxType,
    },
};
use alloy::{hex, primitives::B256};
use futures_util::future::join_all;
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    sync::{Mutex, watch},
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, instrument, warn};

/// Drives settlements from discovery to completion.
#[derive(Debug)]
pub struct SettlementEngine {
    config: Arc<SolverConfig>,
    storage: SolverStorage,
    clients: ChainClients,
    detector: SettlementDetector,
    /// Filled orders already checked for a settlement.
    seen: Mutex<HashSet<B256>>,
    /// Whether the on-chain fill scan completed and its settlements are stored.
    backfilled: AtomicBool,
    metrics: SettlementMetrics,
}

impl SettlementEngine {
    /// Creates a new engine.
    pub fn new(config: Arc<SolverConfig>, storage: SolverStorage, clients: ChainClients) -> Self {
        Self {
            config,
            storage,
            detector: SettlementDetector::new(clients.clone()),
            clients,
            seen: Default::default(),
            backfilled: AtomicBool::new(false),
            metrics: SettlementMetrics::default(),
        }
    }

    /// Runs the engine until `shutdown` fires.
    #[instrument(skip_all, fields(service = "settlement"))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting settlement engine");
        let mut timer = interval(self.config.settlement.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.changed() => break,
            }

            self.tick().await;
        }

        info!("Settlement engine stopped");
    }

    /// Runs discover, settle and verify once. Failures are logged per phase.
    pub async fn tick(&self) {
        if let Err(err) = self.discover().await {
            error!(%err, "Settlement discovery failed");
        }
        if let Err(err) = self.settle().await {
            error!(%err, "Settlement initiation failed");
        }
        if let Err(err) = self.verify().await {
            error!(%err, "Settlement verification failed");
        }
    }

    /// Stores new pending settlements for filled orders.
    ///
    /// Until it completes, the scan of the chains for fills of the solver that are missing from
    /// storage is retried on every call. An order is only marked seen once its settlement, if it
    /// needs one, is stored.
    pub async fn discover(&self) -> Result<(), SettlementError> {
        let mut seen = self.seen.lock().await;

        if !self.backfilled.load(Ordering::Relaxed) {
            let detection = self.detector.detect(&seen).await;
            let mut complete = detection.complete;
            for (order_id, candidate) in detection.checked {
                match self.store_candidate(candidate.as_ref()).await {
                    Ok(()) => {
                        seen.insert(order_id);
                    }
                    Err(err) => {
                        warn!(%order_id, %err, "Failed to store settlement");
                        complete = false;
                    }
                }
            }
            self.backfilled.store(complete, Ordering::Relaxed);
        }

        let filled = self.storage.read_orders_by_status(OrderStatus::Filled).await?;
        let filled_ids: HashSet<B256> = filled.iter().map(|order| order.order_id).collect();
        // only filled orders are checked, ids of anything else can go
        seen.retain(|order_id| filled_ids.contains(order_id));

        for order in filled {
            if seen.contains(&order.order_id) {
                continue;
            }
            let chains = self.config.chain(&order.source_chain_id).and_then(|source| {
                Ok((source, self.config.chain(&order.destination_chain_id)?))
            });
            let (source, destination) = match chains {
                Ok(chains) => chains,
                Err(err) => {
                    warn!(order_id = %order.order_id, %err, "Filled order on unknown chain");
                    continue;
                }
            };

            match self.detector.candidate(order.order_id, source, destination).await {
                Ok(candidate) => {
                    self.store_candidate(candidate.as_ref()).await?;
                    seen.insert(order.order_id);
                }
                Err(err) => warn!(order_id = %order.order_id, %err, "Failed to check fill"),
            }
        }

        Ok(())
    }

    async fn store_candidate(
        &self,
        candidate: Option<&OrderSettlement>,
    ) -> Result<(), SettlementError> {
        let Some(candidate) = candidate else { return Ok(()) };
        if self.storage.insert_settlement(candidate).await? {
            info!(
                order_id = %candidate.order_id,
                source_chain_id = %candidate.source_chain_id,
                destination_chain_id = %candidate.destination_chain_id,
                amount = %candidate.amount,
                "New settlement"
            );
        }
        Ok(())
    }

    /// Initiates every pending batch that reached its settle up threshold.
    ///
    /// Batches are settled concurrently. After the first failure no further batch is
    /// submitted, batches already submitted are still recorded.
    pub async fn settle(&self) -> Result<(), SettlementError> {
        let pending: Vec<OrderSettlement> = self
            .storage
            .read_settlements_by_status(&[SettlementStatus::Pending])
            .await?
            .into_iter()
            .filter(|settlement| settlement.initiate_settlement_tx.is_none())
            .collect();

        let mut eligible = Vec::new();
        for batch in SettlementBatch::by_chain_pair(pending) {
            let threshold = self.config.chain(batch.source_chain_id())?.settle_up_threshold_uusdc;
            if batch.should_initiate_settlement(threshold)? {
                eligible.push(batch);
            } else {
                debug!(
                    source_chain_id = %batch.source_chain_id(),
                    destination_chain_id = %batch.destination_chain_id(),
                    value = %batch.total_value()?,
                    %threshold,
                    "Batch below settle up threshold"
                );
            }
        }

        let cancelled = &AtomicBool::new(false);
        let results = join_all(eligible.iter().map(|batch| async move {
            let result = self.settle_batch(batch, cancelled).await;
            if result.is_err() {
                cancelled.store(true, Ordering::Relaxed);
            }
            result
        }))
        .await;

        results.into_iter().find_map(Result::err).map_or(Ok(()), Err)
    }

    #[instrument(skip_all, fields(
        source_chain_id = %batch.source_chain_id(),
        destination_chain_id = %batch.destination_chain_id(),
        orders = batch.len(),
    ))]
    async fn settle_batch(
        &self,
        batch: &SettlementBatch,
        cancelled: &AtomicBool,
    ) -> Result<(), SettlementError> {
        let source = self.config.chain(batch.source_chain_id())?;
        let repayment_address = hex::decode(&source.solver_address)
            .ok()
            .and_then(|address| left_pad_word(&address))
            .ok_or_else(|| SettlementError::InvalidSolverAddress(source.solver_address.clone()))?;
        let request = SettlementRequest {
            source_domain: source.hyperlane_domain,
            repayment_address,
            order_ids: batch.order_ids(),
        };

        let client = self.clients.client(batch.destination_chain_id()).await?;
        if cancelled.load(Ordering::Relaxed) {
            return Err(SettlementError::Cancelled);
        }
        let sent = client.initiate_batch_settlement(&request).await?;
        if sent.raw_tx.is_empty() {
            return Err(SettlementError::EmptySettlementTx {
                chain_id: batch.destination_chain_id().clone(),
                tx_hash: sent.tx_hash,
            });
        }

        let tx = SubmittedTx::new(
            batch.destination_chain_id().clone(),
            sent.tx_hash,
            sent.raw_tx,
            TxType::Settlement,
        )
        .with_settlement(batch.first().id);
        self.storage.write_settlement_initiation(batch, &tx).await?;

        self.metrics.batches_initiated.increment(1);
        TransactionMetrics::for_tx(batch.destination_chain_id(), TxType::Settlement)
            .submitted
            .increment(1);
        info!(tx_hash = %tx.tx_hash, value = %batch.total_value()?, "Initiated settlement");

        Ok(())
    }

    /// Advances initiated settlements from on-chain state.
    pub async fn verify(&self) -> Result<(), SettlementError> {
        let settlements = self
            .storage
            .read_settlements_by_status(&[
                SettlementStatus::Pending,
                SettlementStatus::SettlementInitiated,
            ])
            .await?;

        for batch in SettlementBatch::by_initiate_tx(settlements) {
            if let Err(err) = self.verify_batch(&batch).await {
                let tx_hash = batch.initiate_settlement_tx();
                warn!(?tx_hash, %err, "Failed to verify settlement");
            }
        }

        Ok(())
    }

    #[instrument(skip_all, fields(tx_hash = ?batch.initiate_settlement_tx()))]
    async fn verify_batch(&self, batch: &SettlementBatch) -> Result<(), SettlementError> {
        let Some(tx_hash) = batch.initiate_settlement_tx() else { return Ok(()) };
        let destination = self.clients.client(batch.destination_chain_id()).await?;

        let Some(result) = destination.tx_result(tx_hash).await? else {
            debug!("Settlement transaction not included yet");
            return Ok(());
        };

        if !result.success {
            let reason = result
                .failure_reason
                .unwrap_or_else(|| format!("settlement transaction {tx_hash} failed"));
            for settlement in batch.settlements() {
                if self
                    .storage
                    .advance_settlement_status(
                        settlement.id,
                        SettlementStatus::Failed,
                        Some(reason.clone()),
                    )
                    .await?
                {
                    self.metrics.failed.increment(1);
                }
            }
            self.storage
                .write_submitted_tx_status(
                    batch.destination_chain_id(),
                    tx_hash,
                    TxStatus::Failed,
                    Some(reason.clone()),
                )
                .await?;
            warn!(%reason, "Settlement transaction failed");
            return Ok(());
        }

        let mut initiated = false;
        for settlement in batch.settlements() {
            if settlement.status == SettlementStatus::Pending {
                self.storage
                    .advance_settlement_status(
                        settlement.id,
                        SettlementStatus::SettlementInitiated,
                        None,
                    )
                    .await?;
                initiated = true;
            }
        }
        if initiated {
            self.storage
                .write_submitted_tx_status(
                    batch.destination_chain_id(),
                    tx_hash,
                    TxStatus::Success,
                    None,
                )
                .await?;
            info!("Settlement initiated");
        }

        let source = self.clients.client(batch.source_chain_id()).await?;
        for settlement in batch.settlements() {
            match source
                .is_settlement_complete(&settlement.source_chain_gateway, settlement.order_id)
                .await
            {
                Ok(true) => {
                    if self
                        .storage
                        .advance_settlement_status(settlement.id, SettlementStatus::Complete, None)
                        .await?
                    {
                        self.metrics.completed.increment(1);
                        info!(order_id = %settlement.order_id, "Settlement complete");
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(order_id = %settlement.order_id, %err, "Failed to check settlement");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::{ChainClient, TxResult},
        test_utils::{MockChainClient, order},
        types::{OnChainOrderStatus, OrderFill},
    };
    use alloy::primitives::U256;

    struct Setup {
        storage: SolverStorage,
        source: Arc<MockChainClient>,
        destination: Arc<MockChainClient>,
        engine: SettlementEngine,
    }

    fn setup(destination: MockChainClient) -> Setup {
        let config = Arc::new(
            serde_yaml::from_str::<SolverConfig>(include_str!("../../config.example.yaml"))
                .unwrap(),
        );
        let storage = SolverStorage::in_memory();
        let source = Arc::new(MockChainClient::new("1"));
        let destination = Arc::new(destination);
        let clients: Vec<Arc<dyn ChainClient>> = vec![source.clone(), destination.clone()];
        let engine = SettlementEngine::new(
            config.clone(),
            storage.clone(),
            ChainClients::with_clients(config, clients),
        );
        Setup { storage, source, destination, engine }
    }

    /// Stores a filled order from chain 1 to 42161 that is unsettled on chain 1.
    async fn filled_order(setup: &Setup, amount: u64) -> B256 {
        let mut order = order("1", "42161");
        order.status = OrderStatus::Filled;
        setup.storage.insert_order(&order).await.unwrap();
        setup.source.set_order(order.order_id, U256::from(amount), OnChainOrderStatus::Unfilled);
        order.order_id
    }

    async fn settlements(
        storage: &SolverStorage,
        status: SettlementStatus,
    ) -> Vec<OrderSettlement> {
        storage.read_settlements_by_status(&[status]).await.unwrap()
    }

    #[tokio::test]
    async fn discovers_filled_orders_once() {
        let setup = setup(MockChainClient::new("42161"));
        let order_id = filled_order(&setup, 1_000).await;

        setup.engine.discover().await.unwrap();
        setup.engine.discover().await.unwrap();

        let pending = settlements(&setup.storage, SettlementStatus::Pending).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, order_id);
        assert_eq!(pending[0].amount, U256::from(1_000));
    }

    fn solver_fill(order_id: B256) -> OrderFill {
        OrderFill {
            order_id,
            source_domain: 1,
            filler: "0x0000000000000000000000000000000000000001".to_string(),
            tx_hash: B256::random().to_string(),
        }
    }

    async fn pending_order_ids(storage: &SolverStorage) -> HashSet<B256> {
        settlements(storage, SettlementStatus::Pending)
            .await
            .iter()
            .map(|settlement| settlement.order_id)
            .collect()
    }

    #[tokio::test]
    async fn backfills_fills_from_chain() {
        let order_id = B256::repeat_byte(0x0f);
        let setup =
            setup(MockChainClient::new("42161").with_filler_fills(vec![solver_fill(order_id)]));
        setup.source.set_order(order_id, U256::from(7), OnChainOrderStatus::Unfilled);

        setup.engine.discover().await.unwrap();

        let pending = settlements(&setup.storage, SettlementStatus::Pending).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, order_id);
        assert_eq!(pending[0].destination_chain_id, "42161");
    }

    #[tokio::test]
    async fn unknown_chain_orders_do_not_block_discovery() {
        let fill_id = B256::repeat_byte(0x0f);
        let setup =
            setup(MockChainClient::new("42161").with_filler_fills(vec![solver_fill(fill_id)]));
        setup.source.set_order(fill_id, U256::from(7), OnChainOrderStatus::Unfilled);
        let mut stray = order("999", "42161");
        stray.status = OrderStatus::Filled;
        setup.storage.insert_order(&stray).await.unwrap();
        let order_id = filled_order(&setup, 1_000).await;

        setup.engine.discover().await.unwrap();
        assert_eq!(pending_order_ids(&setup.storage).await, HashSet::from([fill_id, order_id]));

        // later ticks still pick up new fills
        let next = filled_order(&setup, 2_000).await;
        setup.engine.discover().await.unwrap();
        assert!(pending_order_ids(&setup.storage).await.contains(&next));
    }

    #[tokio::test]
    async fn seen_orders_follow_storage() {
        let setup = setup(MockChainClient::new("42161"));
        let order_id = filled_order(&setup, 1_000).await;

        setup.engine.discover().await.unwrap();
        assert!(setup.engine.seen.lock().await.contains(&order_id));

        setup.storage.write_order_status(order_id, OrderStatus::Abandoned).await.unwrap();
        setup.engine.discover().await.unwrap();
        assert!(setup.engine.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn backfill_is_retried_until_it_completes() {
        let fill_id = B256::repeat_byte(0x0f);
        let setup =
            setup(MockChainClient::new("42161").with_filler_fills(vec![solver_fill(fill_id)]));
        setup.source.set_order(fill_id, U256::from(7), OnChainOrderStatus::Unfilled);
        setup.destination.set_fill_scan_down(true);

        setup.engine.discover().await.unwrap();
        assert!(pending_order_ids(&setup.storage).await.is_empty());
        assert!(!setup.engine.backfilled.load(Ordering::Relaxed));

        setup.destination.set_fill_scan_down(false);
        setup.engine.discover().await.unwrap();
        assert_eq!(pending_order_ids(&setup.storage).await, HashSet::from([fill_id]));
        assert!(setup.engine.backfilled.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn settles_batches_over_threshold() {
        let setup = setup(MockChainClient::new("42161"));
        // chain 1 settles up at 1000 usdc
        filled_order(&setup, 400_000_000).await;
        filled_order(&setup, 350_000_000).await;
        setup.engine.discover().await.unwrap();

        setup.engine.settle().await.unwrap();
        assert!(setup.destination.settlements().is_empty());

        filled_order(&setup, 300_000_000).await;
        setup.engine.discover().await.unwrap();
        setup.engine.settle().await.unwrap();

        let submitted = setup.destination.settlements();
        assert_eq!(submitted.len(), 1);
        let (request, tx) = &submitted[0];
        assert_eq!(request.order_ids.len(), 3);
        assert_eq!(request.source_domain, 1);
        assert_eq!(request.repayment_address, B256::with_last_byte(1));

        let pending = settlements(&setup.storage, SettlementStatus::Pending).await;
        assert_eq!(pending.len(), 3);
        assert!(
            pending
                .iter()
                .all(|s| s.initiate_settlement_tx.as_deref() == Some(tx.tx_hash.as_str()))
        );

        // initiated batches are not settled again
        setup.engine.settle().await.unwrap();
        assert_eq!(setup.destination.settlements().len(), 1);
    }

    #[tokio::test]
    async fn empty_raw_tx_fails_the_batch() {
        let setup = setup(MockChainClient::new("42161").with_empty_raw_tx());
        filled_order(&setup, 1_000_000_000).await;
        setup.engine.discover().await.unwrap();

        assert!(matches!(
            setup.engine.settle().await,
            Err(SettlementError::EmptySettlementTx { .. })
        ));
        let pending = settlements(&setup.storage, SettlementStatus::Pending).await;
        assert!(pending[0].initiate_settlement_tx.is_none());
    }

    #[tokio::test]
    async fn verify_advances_to_complete() {
        let setup = setup(MockChainClient::new("42161"));
        let order_id = filled_order(&setup, 1_000_000_000).await;
        setup.engine.discover().await.unwrap();
        setup.engine.settle().await.unwrap();
        let tx_hash = setup.destination.settlements()[0].1.tx_hash.clone();

        // not included yet
        setup.engine.verify().await.unwrap();
        assert_eq!(settlements(&setup.storage, SettlementStatus::Pending).await.len(), 1);

        setup.destination.set_tx_result(
            &tx_hash,
            TxResult { gas_cost: U256::from(1), success: true, failure_reason: None },
        );
        setup.engine.verify().await.unwrap();
        assert_eq!(
            settlements(&setup.storage, SettlementStatus::SettlementInitiated).await.len(),
            1
        );

        setup.source.set_status(order_id, OnChainOrderStatus::Filled);
        setup.engine.verify().await.unwrap();
        let complete = settlements(&setup.storage, SettlementStatus::Complete).await;
        assert_eq!(complete.len(), 1);

        // terminal settlements are left alone
        setup.destination.set_tx_result(
            &tx_hash,
            TxResult { gas_cost: U256::from(1), success: false, failure_reason: None },
        );
        setup.engine.verify().await.unwrap();
        assert_eq!(settlements(&setup.storage, SettlementStatus::Complete).await.len(), 1);
        assert!(settlements(&setup.storage, SettlementStatus::Failed).await.is_empty());
    }

    #[tokio::test]
    async fn verify_marks_failed_settlements() {
        let setup = setup(MockChainClient::new("42161"));
        filled_order(&setup, 1_000_000_000).await;
        setup.engine.discover().await.unwrap();
        setup.engine.settle().await.unwrap();
        let tx_hash = setup.destination.settlements()[0].1.tx_hash.clone();

        setup.destination.set_tx_result(
            &tx_hash,
            TxResult {
                gas_cost: U256::from(1),
                success: false,
                failure_reason: Some("out of gas".to_string()),
            },
        );
        setup.engine.verify().await.unwrap();

        let failed = settlements(&setup.storage, SettlementStatus::Failed).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status_message.as_deref(), Some("out of gas"));

        setup.engine.verify().await.unwrap();
        setup.engine.settle().await.unwrap();
        assert_eq!(setup.destination.settlements().len(), 1);
    }

    #[tokio::test]
    async fn failed_submission_is_reported() {
        let setup = setup(MockChainClient::new("42161").with_failing_settlements());
        filled_order(&setup, 1_000_000_000).await;
        setup.engine.discover().await.unwrap();

        let err = setup.engine.settle().await.unwrap_err();
        assert!(matches!(err, SettlementError::Chain(ref err) if err.is_revert()));
    }
}
