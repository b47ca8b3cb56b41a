//! Settlement of filled orders.
//!
//! Orders the solver filled on their destination chain are repaid on their source chain once the
//! destination gateway settles them over Hyperlane. The [`SettlementEngine`] finds fills that need
//! a settlement, submits them in batches and follows them until the source chain reports them as
//! settled.

use crate::{
    chains::ChainError, config::ConfigError, storage::StorageError, types::BatchError,
    types::ChainId,
};

mod detector;
pub use detector::{Detection, SettlementDetector};

mod engine;
pub use engine::SettlementEngine;

/// Errors raised while settling orders.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A chain request failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A batch could not be valued.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// The settlement transaction came back without its raw bytes.
    #[error("settlement transaction {tx_hash} on chain {chain_id} has no raw bytes")]
    EmptySettlementTx {
        /// Chain the transaction was sent to.
        chain_id: ChainId,
        /// Transaction hash.
        tx_hash: String,
    },
    /// The solver address of a chain cannot be used as a repayment address.
    #[error("invalid solver address {0}")]
    InvalidSolverAddress(String),
    /// The batch was not submitted because another batch failed.
    #[error("settlement cancelled after another batch failed")]
    Cancelled,
}
