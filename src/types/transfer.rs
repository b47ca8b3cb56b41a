use super::ChainId;
use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of a [`HyperlaneTransfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// The message still has to be delivered.
    Pending,
    /// The message was delivered on the destination chain.
    Success,
    /// Delivery failed permanently and will not be retried.
    Abandoned,
}

/// An obligation to relay one Hyperlane message from a source to a destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperlaneTransfer {
    /// Storage id. Zero until the record is persisted.
    pub id: i64,
    /// Chain the message was dispatched on.
    pub source_chain_id: ChainId,
    /// Chain the message must be delivered to.
    pub destination_chain_id: ChainId,
    /// Hyperlane message id.
    pub message_id: B256,
    /// Hash of the transaction that dispatched the message.
    pub message_sent_tx: String,
    /// Current status.
    pub status: TransferStatus,
    /// When the transfer was first registered.
    pub created_at: DateTime<Utc>,
}

impl HyperlaneTransfer {
    /// Creates a new pending transfer.
    pub fn pending(
        source_chain_id: ChainId,
        destination_chain_id: ChainId,
        message_id: B256,
        message_sent_tx: String,
    ) -> Self {
        Self {
            id: 0,
            source_chain_id,
            destination_chain_id,
            message_id,
            message_sent_tx,
            status: TransferStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
