//! Order fulfillment.
//!
//! Pending orders are polled from storage into an [`OrderQueue`] that a pool of workers fills
//! from. Orders that expired unfilled get their timeout initiated so the user is refunded on the
//! source chain.

use crate::{chains::ChainError, config::ConfigError, storage::StorageError};

mod dispatcher;
pub use dispatcher::FulfillmentDispatcher;

mod queue;
pub use queue::OrderQueue;

/// Errors raised while filling or timing out orders.
#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A chain request failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
