use super::HyperlaneClientError;
use crate::chains::SentTx;
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::fmt::Debug;

/// A message dispatched through a Hyperlane mailbox, as read from the dispatching transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedMessage {
    /// Domain of the origin mailbox.
    pub origin_domain: u32,
    /// Domain of the destination mailbox.
    pub destination_domain: u32,
    /// Sender on the origin chain.
    pub sender: Address,
    /// Recipient on the destination chain, as a 32 byte word.
    pub recipient: B256,
    /// Message id.
    pub message_id: B256,
    /// The encoded message.
    pub message: Bytes,
    /// Index the message was inserted at in the origin merkle tree hook.
    pub index: u32,
}

impl DispatchedMessage {
    /// The recipient as an EVM address.
    pub fn recipient_address(&self) -> Address {
        Address::from_word(self.recipient)
    }
}

/// Hyperlane operations on the chains the solver relays between.
///
/// Chains are addressed by chain id and resolved to their mailbox, merkle tree hook and validator
/// announce contracts through the solver configuration.
#[async_trait]
pub trait HyperlaneClient: Debug + Send + Sync {
    /// Returns true if the destination mailbox processed `message_id`.
    async fn has_been_delivered(
        &self,
        chain_id: &str,
        message_id: B256,
    ) -> Result<bool, HyperlaneClientError>;

    /// Returns the module type of the interchain security module at `ism`.
    async fn ism_module_type(&self, chain_id: &str, ism: Address)
    -> Result<u8, HyperlaneClientError>;

    /// Returns the validator set and signature threshold `recipient`'s security module requires
    /// for `message`.
    async fn validators_and_threshold(
        &self,
        chain_id: &str,
        recipient: Address,
        message: &Bytes,
    ) -> Result<(Vec<Address>, u8), HyperlaneClientError>;

    /// Returns the storage locations each validator announced, in announcement order.
    async fn validator_storage_locations(
        &self,
        chain_id: &str,
        validators: &[Address],
    ) -> Result<Vec<Vec<String>>, HyperlaneClientError>;

    /// Returns the number of leaves in the merkle tree hook.
    async fn merkle_tree_leaf_count(&self, chain_id: &str) -> Result<u32, HyperlaneClientError>;

    /// Submits the delivery of `message` with the proof `metadata` to the destination mailbox.
    async fn process(
        &self,
        chain_id: &str,
        message: &Bytes,
        metadata: &Bytes,
    ) -> Result<SentTx, HyperlaneClientError>;

    /// Returns true if `address` has code.
    async fn is_contract(
        &self,
        chain_id: &str,
        address: Address,
    ) -> Result<bool, HyperlaneClientError>;

    /// Reads the message dispatched by the origin transaction `tx_hash`.
    async fn dispatch(
        &self,
        chain_id: &str,
        tx_hash: &str,
    ) -> Result<DispatchedMessage, HyperlaneClientError>;

    /// Quotes the cost of delivering `message` in uusdc.
    ///
    /// Fails with [`HyperlaneClientError::Reverted`] if delivery would revert.
    async fn quote_process_uusdc(
        &self,
        chain_id: &str,
        message: &Bytes,
        metadata: &Bytes,
    ) -> Result<U256, HyperlaneClientError>;
}
