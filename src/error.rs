//! Solver errors.

pub use crate::{
    chains::ChainError,
    config::ConfigError,
    fulfillment::FulfillmentError,
    hyperlane::{CheckpointError, HyperlaneClientError, RelayError},
    settlement::SettlementError,
    storage::StorageError,
    types::BatchError,
};

/// The overarching error type returned by the solver services.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// An error with the configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An error occurred talking to a chain.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// An error occurred in storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An error occurred while filling orders.
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    /// An error occurred while settling orders.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    /// An error occurred while relaying a Hyperlane message.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// An internal error occurred.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}
