//! Types for metrics.

use metrics::Counter;
use metrics_derive::Metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, sync::Mutex, time::Duration};

/// Metrics for transactions submitted by the solver.
#[derive(Metrics, Clone)]
#[metrics(scope = "transactions")]
pub struct TransactionMetrics {
    /// Number of submitted transactions.
    pub submitted: Counter,
}

impl TransactionMetrics {
    /// Metrics for transactions of `tx_type` on `chain_id`.
    pub fn for_tx(chain_id: &str, tx_type: impl ToString) -> Self {
        Self::new_with_labels(&[
            ("chain_id", chain_id.to_string()),
            ("tx_type", tx_type.to_string()),
        ])
    }
}

/// Metrics for the Hyperlane relayer.
#[derive(Metrics, Clone)]
#[metrics(scope = "relayer")]
pub struct RelayerMetrics {
    /// Number of submitted message deliveries.
    pub relays_submitted: Counter,
    /// Number of transfers abandoned after a permanent failure.
    pub transfers_abandoned: Counter,
}

/// Per validator metrics for the Hyperlane relayer.
#[derive(Metrics, Clone)]
#[metrics(scope = "relayer")]
pub struct ValidatorMetrics {
    /// Number of failed checkpoint fetches or verifications.
    pub checkpointing_errors: Counter,
}

impl ValidatorMetrics {
    /// Metrics for `validator`.
    pub fn for_validator(validator: impl ToString) -> Self {
        Self::new_with_labels(&[("validator", validator.to_string())])
    }
}

/// Per destination chain metrics for relay fees.
#[derive(Metrics, Clone)]
#[metrics(scope = "relayer")]
pub struct RelayFeeMetrics {
    /// Number of relays skipped because the fee exceeded the cap.
    pub relay_too_expensive: Counter,
}

impl RelayFeeMetrics {
    /// Metrics for `chain_id`.
    pub fn for_chain(chain_id: &str) -> Self {
        Self::new_with_labels(&[("chain_id", chain_id.to_string())])
    }
}

/// Metrics for the settlement engine.
#[derive(Metrics, Clone)]
#[metrics(scope = "settlement")]
pub struct SettlementMetrics {
    /// Number of initiated settlement batches.
    pub batches_initiated: Counter,
    /// Number of settlements that failed on chain.
    pub failed: Counter,
    /// Number of completed settlements.
    pub completed: Counter,
}

/// Metrics for order fulfillment.
#[derive(Metrics, Clone)]
#[metrics(scope = "fulfillment")]
pub struct FulfillmentMetrics {
    /// Number of submitted fills.
    pub orders_filled: Counter,
    /// Number of submitted timeouts.
    pub timeouts_initiated: Counter,
    /// Number of orders the queue rejected.
    pub enqueue_rejected: Counter,
}

/// Builds a Prometheus exporter, returning a handle.
///
/// The recorder will perform upkeep every 5 seconds.
///
/// # Panics
///
/// This will panic if the Prometheus recorder could not be set as the global metrics recorder.
pub async fn setup_exporter(metrics_addr: impl Into<SocketAddr>) -> PrometheusHandle {
    static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

    let mut lock = HANDLE.lock().unwrap();
    if let Some(handle) = &*lock {
        return handle.clone();
    }

    let addr: SocketAddr = metrics_addr.into();
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .upkeep_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build metrics recorder");

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).expect("could not set metrics recorder");
    tokio::spawn(exporter);

    tracing::info!(target: "solver::spawn", %addr, "Started metrics server");

    *lock = Some(handle.clone());

    handle
}
