//! Solver constants.

use std::time::Duration;

/// Default interval between settlement engine ticks.
pub const DEFAULT_SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of fulfillment workers.
pub const DEFAULT_FULFILLMENT_WORKERS: usize = 10;

/// Default capacity of the fulfillment queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default delay before a dequeued order may be enqueued again.
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(60);

/// Default interval between sweeps of expired fulfillment cooldowns.
pub const DEFAULT_COOLDOWN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between polls for pending orders.
pub const DEFAULT_FULFILLMENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between polls for orders awaiting a refund.
pub const DEFAULT_REFUND_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default interval between relayer runs.
pub const DEFAULT_RELAYER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default block range scanned per request when listing fills.
pub const DEFAULT_FILL_SCAN_PAGE_SIZE: u64 = 10_000;

/// Default port the Prometheus exporter listens on.
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// Environment variable holding the solver signing key.
pub const SOLVER_PRIVATE_KEY_ENV: &str = "SOLVER_PRIVATE_KEY";

/// Hyperlane ISM module type of a routing ISM.
pub const ISM_MODULE_TYPE_ROUTING: u8 = 1;

/// Hyperlane ISM module type of a message id multisig ISM.
pub const ISM_MODULE_TYPE_MESSAGE_ID_MULTISIG: u8 = 5;

/// Maximum depth of nested routing ISMs followed when resolving a recipient ISM.
pub const MAX_ISM_ROUTING_DEPTH: usize = 4;
