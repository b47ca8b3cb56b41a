//! Single message relay.

use super::{
    DispatchedMessage, HyperlaneClient, RelayError,
    fetcher::{CheckpointFetcher, FetcherFactory},
    metadata::encode_metadata,
    quorum::find_quorum,
};
use crate::{
    chains::SentTx,
    config::SolverConfig,
    metrics::{RelayFeeMetrics, TransactionMetrics, ValidatorMetrics},
    types::{ChainId, TxType},
};
use alloy::primitives::{Address, U256};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A submitted message delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedMessage {
    /// The delivered message.
    pub dispatch: DispatchedMessage,
    /// Chain the message was delivered to.
    pub destination_chain_id: ChainId,
    /// The delivery transaction.
    pub tx: SentTx,
}

/// Relays single Hyperlane messages.
#[derive(Debug, Clone)]
pub struct Relayer {
    config: Arc<SolverConfig>,
    client: Arc<dyn HyperlaneClient>,
    fetchers: Arc<dyn FetcherFactory>,
}

impl Relayer {
    /// Creates a relayer.
    pub fn new(
        config: Arc<SolverConfig>,
        client: Arc<dyn HyperlaneClient>,
        fetchers: Arc<dyn FetcherFactory>,
    ) -> Self {
        Self { config, client, fetchers }
    }

    /// The Hyperlane client used for relaying.
    pub fn client(&self) -> &Arc<dyn HyperlaneClient> {
        &self.client
    }

    /// Delivers the message dispatched by `tx_hash` on `origin_chain_id`.
    ///
    /// If `max_fee_uusdc` is set, the delivery is simulated first and only submitted if its cost
    /// does not exceed the cap.
    #[instrument(skip(self))]
    pub async fn relay(
        &self,
        origin_chain_id: &str,
        tx_hash: &str,
        max_fee_uusdc: Option<U256>,
    ) -> Result<RelayedMessage, RelayError> {
        let dispatch = self.client.dispatch(origin_chain_id, tx_hash).await?;
        let message_id = dispatch.message_id;

        let count = self.client.merkle_tree_leaf_count(origin_chain_id).await?;
        if dispatch.index >= count {
            return Err(RelayError::MessageNotInTree { index: dispatch.index, count });
        }

        let destination = self.config.chain_by_domain(dispatch.destination_domain)?;
        let destination_chain_id = destination.chain_id.clone();

        if self.client.has_been_delivered(&destination_chain_id, message_id).await? {
            return Err(RelayError::MessageAlreadyDelivered(message_id));
        }

        let recipient = dispatch.recipient_address();
        if !self.client.is_contract(&destination_chain_id, recipient).await? {
            return Err(RelayError::RecipientNotContract(recipient));
        }

        let (validators, threshold) = self
            .client
            .validators_and_threshold(&destination_chain_id, recipient, &dispatch.message)
            .await?;
        if validators.is_empty() {
            return Err(RelayError::NoValidators(message_id));
        }
        debug!(%message_id, threshold, validators = %validators.iter().join(", "), "Resolved ism");

        let fetchers = self.fetchers(origin_chain_id, &validators).await?;
        let quorum = find_quorum(&fetchers, dispatch.index, threshold as usize).await?;

        let checkpoint = &quorum.checkpoint;
        if checkpoint.message_id != message_id || checkpoint.checkpoint.index != dispatch.index {
            return Err(RelayError::CheckpointMismatch {
                expected_message_id: message_id,
                expected_index: dispatch.index,
                message_id: checkpoint.message_id,
                index: checkpoint.checkpoint.index,
            });
        }

        let metadata = encode_metadata(&quorum);

        if let Some(max) = max_fee_uusdc {
            let fee = match self
                .client
                .quote_process_uusdc(&destination_chain_id, &dispatch.message, &metadata)
                .await
            {
                Ok(fee) => fee,
                Err(err) if err.is_revert() => {
                    return Err(RelayError::CouldNotDetermineRelayFee(err.to_string()));
                }
                Err(err) => return Err(err.into()),
            };

            if fee.is_zero() {
                warn!(%message_id, "Relay fee quote is zero");
                return Err(RelayError::NotProfitable(fee));
            }
            if fee > max {
                RelayFeeMetrics::for_chain(&destination_chain_id).relay_too_expensive.increment(1);
                return Err(RelayError::RelayTooExpensive { fee, max });
            }
            debug!(%message_id, %fee, %max, "Relay fee within cap");
        }

        let tx = self.client.process(&destination_chain_id, &dispatch.message, &metadata).await?;
        TransactionMetrics::for_tx(&destination_chain_id, TxType::MessageDelivery)
            .submitted
            .increment(1);

        info!(
            %message_id,
            %destination_chain_id,
            tx_hash = %tx.tx_hash,
            signatures = quorum.signatures.len(),
            "Submitted message delivery"
        );
        Ok(RelayedMessage { dispatch, destination_chain_id, tx })
    }

    /// Builds a checkpoint fetcher for every validator with a usable storage location.
    ///
    /// Configured overrides take precedence over announced locations. Of the announced
    /// locations, the most recent one is used.
    async fn fetchers(
        &self,
        origin_chain_id: &str,
        validators: &[Address],
    ) -> Result<Vec<Arc<dyn CheckpointFetcher>>, RelayError> {
        let announced =
            self.client.validator_storage_locations(origin_chain_id, validators).await?;
        let overrides = &self.config.relayer.validator_storage_overrides;

        let mut fetchers = Vec::with_capacity(validators.len());
        for (i, validator) in validators.iter().enumerate() {
            let location = overrides
                .get(validator)
                .or_else(|| announced.get(i).and_then(|locations| locations.last()));
            let Some(location) = location else {
                warn!(%validator, "Validator has no storage location");
                continue;
            };

            match self.fetchers.fetcher(*validator, location) {
                Ok(fetcher) => fetchers.push(fetcher),
                Err(err) => {
                    warn!(%validator, %location, %err, "Unusable validator storage location");
                    ValidatorMetrics::for_validator(validator).checkpointing_errors.increment(1);
                }
            }
        }

        Ok(fetchers)
    }
}
