//! # Solver
//!
//! Library for a fast transfer solver: order fulfillment, batched settlement and Hyperlane
//! message relaying.

pub mod chains;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod fulfillment;
pub mod hyperlane;
pub mod metrics;
pub mod serde;
pub mod settlement;
pub mod spawn;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_utils;
