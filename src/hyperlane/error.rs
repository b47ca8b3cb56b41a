use crate::{
    chains::{ChainError, revert_message},
    config::ConfigError,
    storage::StorageError,
    types::ChainId,
};
use alloy::{
    primitives::{Address, B256, U256},
    transports::TransportError,
};

/// Errors raised while fetching or verifying validator checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The recovery id is neither `0/1` nor `27/28`.
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u64),
    /// Public key recovery failed.
    #[error(transparent)]
    Signature(#[from] alloy::primitives::SignatureError),
    /// ECDSA verification against the recovered key failed.
    #[error("signature verification failed: {0}")]
    Verification(#[from] k256::ecdsa::Error),
    /// The checkpoint was signed by someone else than the validator it was fetched for.
    #[error("checkpoint signed by {recovered}, expected {expected}")]
    SignerMismatch {
        /// Validator the checkpoint was fetched for.
        expected: Address,
        /// Recovered signer.
        recovered: Address,
    },
    /// A storage location could not be parsed.
    #[error("invalid storage location {0}")]
    InvalidLocation(String),
    /// A storage location uses a scheme without fetcher.
    #[error("unsupported storage location {0}")]
    UnsupportedLocation(String),
    /// Reading a local checkpoint failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A checkpoint could not be decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An HTTP request failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Object storage answered with an unexpected status.
    #[error("unexpected status {status} fetching {url}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Requested url.
        url: String,
    },
}

/// Errors returned by [`HyperlaneClient`](super::HyperlaneClient) implementations.
#[derive(Debug, thiserror::Error)]
pub enum HyperlaneClientError {
    /// Execution reverted on chain.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// The recipient is protected by a module type that cannot be relayed to.
    #[error("unsupported ism {address} of module type {module_type}")]
    UnsupportedIsm {
        /// Module address.
        address: Address,
        /// Module type.
        module_type: u8,
    },
    /// Routing modules nest deeper than the solver follows.
    #[error("ism routing for recipient {0} is nested too deep")]
    IsmRoutingTooDeep(Address),
    /// The transaction did not dispatch a message through the configured mailbox.
    #[error("no dispatch found in transaction {0}")]
    DispatchNotFound(String),
    /// The transaction has no receipt yet.
    #[error("no receipt for transaction {0}")]
    ReceiptNotFound(String),
    /// Fees cannot be converted to uusdc without a gas token price.
    #[error("no gas token price configured for chain {0}")]
    MissingGasTokenPrice(ChainId),
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The underlying chain client failed.
    #[error(transparent)]
    Chain(ChainError),
}

impl HyperlaneClientError {
    /// Returns true if the error is an on-chain execution revert.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

impl From<ChainError> for HyperlaneClientError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted(message) => Self::Reverted(message),
            ChainError::Config(err) => Self::Config(err),
            err => Self::Chain(err),
        }
    }
}

impl From<TransportError> for HyperlaneClientError {
    fn from(err: TransportError) -> Self {
        match revert_message(&err) {
            Some(message) => Self::Reverted(message),
            None => Self::Chain(ChainError::Transport(err)),
        }
    }
}

impl From<alloy::contract::Error> for HyperlaneClientError {
    fn from(err: alloy::contract::Error) -> Self {
        ChainError::from(err).into()
    }
}

/// Errors returned while relaying a message.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The message was delivered already.
    #[error("message {0} already delivered")]
    MessageAlreadyDelivered(B256),
    /// The origin merkle tree hook does not contain the message index yet.
    #[error("merkle tree has {count} leaves, message is at index {index}")]
    MessageNotInTree {
        /// Message index.
        index: u32,
        /// Leaf count reported by the hook.
        count: u32,
    },
    /// The message recipient has no code on the destination chain.
    #[error("recipient {0} is not a contract")]
    RecipientNotContract(Address),
    /// The destination ism returned an empty validator set.
    #[error("no validators for message {0}")]
    NoValidators(B256),
    /// No root was signed by enough validators.
    #[error("not enough signatures found for index {index}: {found} of {threshold}")]
    NotEnoughSignaturesFound {
        /// Checkpoint index.
        index: u32,
        /// Required signatures.
        threshold: usize,
        /// Most signatures found for a single root.
        found: usize,
    },
    /// The quorum checkpoint does not commit to the dispatched message.
    #[error(
        "checkpoint mismatch: expected message {expected_message_id} at {expected_index}, got {message_id} at {index}"
    )]
    CheckpointMismatch {
        /// Dispatched message id.
        expected_message_id: B256,
        /// Merkle tree index of the dispatched message.
        expected_index: u32,
        /// Message id in the checkpoint.
        message_id: B256,
        /// Index in the checkpoint.
        index: u32,
    },
    /// Simulating delivery reverted, so no fee could be quoted.
    #[error("could not determine relay fee: {0}")]
    CouldNotDetermineRelayFee(String),
    /// The quoted fee is not positive.
    #[error("relay fee quote {0} is not profitable")]
    NotProfitable(U256),
    /// The quoted fee exceeds the cap.
    #[error("relay fee {fee} exceeds max {max}")]
    RelayTooExpensive {
        /// Quoted fee in uusdc.
        fee: U256,
        /// Fee cap in uusdc.
        max: U256,
    },
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A Hyperlane client call failed.
    #[error(transparent)]
    Client(#[from] HyperlaneClientError),
    /// A chain client call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A checkpoint could not be fetched.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RelayError {
    /// Returns true for failures that will not go away on retry.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::CheckpointMismatch { .. } => true,
            Self::Client(err) => err.is_revert(),
            Self::Chain(err) => err.is_revert(),
            _ => false,
        }
    }

    /// Returns true for expected outcomes that are not failures.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::MessageAlreadyDelivered(_)
                | Self::NotEnoughSignaturesFound { .. }
                | Self::CouldNotDetermineRelayFee(_)
                | Self::NotProfitable(_)
                | Self::RelayTooExpensive { .. }
        )
    }
}
