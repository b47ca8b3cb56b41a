use super::{FulfillmentError, OrderQueue};
use crate::{
    chains::ChainClients,
    config::SolverConfig,
    metrics::{FulfillmentMetrics, TransactionMetrics},
    storage::{SolverStorage, StorageApi},
    types::{OnChainOrderStatus, Order, OrderStatus, SubmittedTx, TxType},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, instrument, warn};

/// Fills pending orders and initiates timeouts for expired ones.
#[derive(Debug)]
pub struct FulfillmentDispatcher {
    config: Arc<SolverConfig>,
    storage: SolverStorage,
    clients: ChainClients,
    queue: OrderQueue,
    metrics: FulfillmentMetrics,
}

impl FulfillmentDispatcher {
    /// Creates a new dispatcher.
    pub fn new(config: Arc<SolverConfig>, storage: SolverStorage, clients: ChainClients) -> Self {
        let queue = OrderQueue::new(
            config.fulfillment.queue_capacity,
            config.fulfillment.requeue_delay,
        );
        Self { config, storage, clients, queue, metrics: FulfillmentMetrics::default() }
    }

    /// Runs the order poll, the refund poll, the cooldown sweeper and the fill workers until
    /// `shutdown` fires.
    #[instrument(skip_all, fields(service = "fulfillment"))]
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let workers = self.config.fulfillment.workers.max(1);
        info!(workers, "Starting fulfillment dispatcher");
        let this = Arc::new(self);

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let this = this.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { this.worker(worker, shutdown).await });
        }

        let fulfillment = &this.config.fulfillment;
        tokio::join!(
            this.poll_orders(shutdown.clone()),
            this.poll_refunds(shutdown.clone()),
            this.queue.run_sweeper(fulfillment.cooldown_sweep_interval, shutdown),
        );
        tasks.join_all().await;

        info!("Fulfillment dispatcher stopped");
    }

    async fn poll_orders(&self, shutdown: watch::Receiver<bool>) {
        every(self.config.fulfillment.poll_interval, shutdown, || async {
            if let Err(err) = self.enqueue_pending().await {
                error!(%err, "Failed to poll pending orders");
            }
        })
        .await
    }

    async fn poll_refunds(&self, shutdown: watch::Receiver<bool>) {
        if !self.config.fulfillment.enable_refunds {
            info!("Refunds disabled");
            return;
        }

        every(self.config.fulfillment.refund_poll_interval, shutdown, || async {
            if let Err(err) = self.process_refunds().await {
                error!(%err, "Failed to poll expired orders");
            }
        })
        .await
    }

    async fn worker(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            let order = tokio::select! {
                order = self.queue.dequeue() => order,
                _ = shutdown.changed() => break,
            };
            let Some(order) = order else { break };

            let order_id = order.order_id;
            if let Err(err) = self.process_order(order).await {
                warn!(worker, %order_id, %err, "Failed to fill order");
            }
        }
    }

    /// Enqueues every pending order, returning how many were accepted.
    pub async fn enqueue_pending(&self) -> Result<usize, FulfillmentError> {
        let mut accepted = 0;
        for order in self.storage.read_orders_by_status(OrderStatus::Pending).await? {
            if self.queue.enqueue(order) {
                accepted += 1;
            } else {
                self.metrics.enqueue_rejected.increment(1);
            }
        }
        Ok(accepted)
    }

    /// Fills `order` if it is still pending, unfilled and not expired.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn process_order(&self, order: Order) -> Result<(), FulfillmentError> {
        let Some(order) = self.storage.read_order(order.order_id).await? else {
            return Ok(());
        };
        if order.status != OrderStatus::Pending {
            debug!(status = %order.status, "Order no longer pending");
            return Ok(());
        }

        let destination = self.clients.client(&order.destination_chain_id).await?;
        if let Some(fill) = destination.order_fill(order.order_id).await? {
            info!(tx_hash = %fill.tx_hash, "Order already filled");
            self.storage.write_order_status(order.order_id, OrderStatus::Filled).await?;
            return Ok(());
        }

        if order.is_expired(Utc::now()) {
            info!("Order expired unfilled");
            self.storage
                .write_order_status(order.order_id, OrderStatus::ExpiredPendingRefund)
                .await?;
            return Ok(());
        }

        if !self.config.fulfillment.enable_fills {
            debug!("Fills disabled");
            return Ok(());
        }

        let source = self.config.chain(&order.source_chain_id)?;
        let sent = destination.submit_fill(&order, source.hyperlane_domain).await?;
        let tx = SubmittedTx::new(
            order.destination_chain_id.clone(),
            sent.tx_hash,
            sent.raw_tx,
            TxType::Fill,
        )
        .with_order(order.order_id);
        self.storage.write_order_fill(order.order_id, &tx).await?;

        self.metrics.orders_filled.increment(1);
        TransactionMetrics::for_tx(&order.destination_chain_id, TxType::Fill)
            .submitted
            .increment(1);
        info!(tx_hash = %tx.tx_hash, chain_id = %order.destination_chain_id, "Filled order");

        Ok(())
    }

    /// Processes every order awaiting a refund, unless refunds are disabled. Failures are logged
    /// per order.
    pub async fn process_refunds(&self) -> Result<(), FulfillmentError> {
        if !self.config.fulfillment.enable_refunds {
            debug!("Refunds disabled");
            return Ok(());
        }

        for order in self.storage.read_orders_by_status(OrderStatus::ExpiredPendingRefund).await? {
            let order_id = order.order_id;
            if let Err(err) = self.process_refund(order).await {
                warn!(%order_id, %err, "Failed to process refund");
            }
        }
        Ok(())
    }

    /// Initiates the timeout of an expired order unless it was filled, refunded, or a timeout
    /// was already submitted.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn process_refund(&self, order: Order) -> Result<(), FulfillmentError> {
        let destination = self.clients.client(&order.destination_chain_id).await?;
        if destination.order_fill(order.order_id).await?.is_some() {
            info!("Expired order was filled");
            self.storage.write_order_status(order.order_id, OrderStatus::Filled).await?;
            return Ok(());
        }

        let source = self.clients.client(&order.source_chain_id).await?;
        let status = source.order_status(&order.source_chain_gateway, order.order_id).await?;
        if status == OnChainOrderStatus::Refunded {
            info!("Order refunded");
            self.storage.write_order_status(order.order_id, OrderStatus::Refunded).await?;
            return Ok(());
        }

        let submitted = self.storage.read_submitted_txs_for_order(order.order_id).await?;
        if submitted.iter().any(|tx| tx.tx_type == TxType::Timeout) {
            debug!("Timeout already submitted");
            return Ok(());
        }

        let source_domain = self.config.chain(&order.source_chain_id)?.hyperlane_domain;
        let sent = destination.submit_timeout(&order, source_domain).await?;
        let tx = SubmittedTx::new(
            order.destination_chain_id.clone(),
            sent.tx_hash,
            sent.raw_tx,
            TxType::Timeout,
        )
        .with_order(order.order_id);
        self.storage.write_order_timeout(order.order_id, &tx).await?;

        self.metrics.timeouts_initiated.increment(1);
        TransactionMetrics::for_tx(&order.destination_chain_id, TxType::Timeout)
            .submitted
            .increment(1);
        info!(tx_hash = %tx.tx_hash, chain_id = %order.destination_chain_id, "Initiated timeout");

        Ok(())
    }
}

/// Calls `f` every `period` until `shutdown` fires.
async fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            _ = shutdown.changed() => break,
        }

        f().await;
    }
}
