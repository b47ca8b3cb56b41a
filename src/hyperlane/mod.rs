//! Hyperlane message relaying.
//!
//! Settlement and timeout transactions dispatch a Hyperlane message on the chain they are sent
//! to. The [`RelayerRunner`] registers those messages as transfers and delivers each one through
//! the [`Relayer`], which assembles a quorum of validator signatures over the origin merkle root
//! and submits it as message id multisig ism metadata.

pub mod checkpoint;
pub mod contracts;
pub mod fetcher;
pub mod metadata;

mod client;
pub use client::{DispatchedMessage, HyperlaneClient};

mod error;
pub use error::{CheckpointError, HyperlaneClientError, RelayError};

mod evm;
pub use evm::EvmHyperlaneClient;

mod quorum;
pub use quorum::{MultisigSignedCheckpoint, ValidatorSignature, find_quorum};

mod relay;
pub use relay::{RelayedMessage, Relayer};

mod runner;
pub use runner::RelayerRunner;
