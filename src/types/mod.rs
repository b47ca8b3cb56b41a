//! Shared domain types.

mod order;
pub use order::*;

mod settlement;
pub use settlement::*;

mod transfer;
pub use transfer::*;

mod submitted_tx;
pub use submitted_tx::*;

/// Chain identifier as used by the solver.
///
/// Chain ids are kept in their native string form (`"1"`, `"42161"`, `"osmosis-1"`) so that EVM,
/// Cosmos and SVM chains share one key space.
pub type ChainId = String;
