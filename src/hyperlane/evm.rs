//! EVM Hyperlane client.

use super::{
    DispatchedMessage, HyperlaneClient, HyperlaneClientError,
    contracts::{
        IInterchainSecurityModule, IMailbox, IMerkleTreeHook, IMultisigIsm, IRoutingIsm,
        IValidatorAnnounce,
    },
};
use crate::{
    chains::{EvmChainClient, SentTx},
    config::{HyperlaneChainConfig, SolverConfig},
    constants::{ISM_MODULE_TYPE_MESSAGE_ID_MULTISIG, ISM_MODULE_TYPE_ROUTING, MAX_ISM_ROUTING_DEPTH},
    types::ChainId,
};
use alloy::{
    network::TransactionBuilder,
    primitives::{Address, B256, Bytes, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Wei per whole native token.
const WEI_PER_TOKEN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// [`HyperlaneClient`] for EVM chains.
#[derive(Debug, Clone)]
pub struct EvmHyperlaneClient {
    config: Arc<SolverConfig>,
    signer: Option<PrivateKeySigner>,
    clients: Arc<Mutex<HashMap<ChainId, Arc<EvmChainClient>>>>,
}

impl EvmHyperlaneClient {
    /// Creates a client. Messages can only be delivered if a signer is given.
    pub fn new(config: Arc<SolverConfig>, signer: Option<PrivateKeySigner>) -> Self {
        Self { config, signer, clients: Default::default() }
    }

    async fn chain(
        &self,
        chain_id: &str,
    ) -> Result<(Arc<EvmChainClient>, HyperlaneChainConfig), HyperlaneClientError> {
        let chain = self.config.chain(chain_id)?;
        let hyperlane = chain.hyperlane()?.clone();

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(chain_id) {
            return Ok((client.clone(), hyperlane));
        }
        let client = Arc::new(EvmChainClient::new(chain.clone(), self.signer.clone())?);
        clients.insert(chain.chain_id.clone(), client.clone());

        Ok((client, hyperlane))
    }

    /// Follows routing modules from `recipient`'s ism to the multisig ism that verifies `message`.
    async fn resolve_multisig_ism(
        &self,
        chain_id: &str,
        recipient: Address,
        message: &Bytes,
    ) -> Result<Address, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        let mut ism =
            IMailbox::new(hyperlane.mailbox, client.provider()).recipientIsm(recipient).call().await?;

        for _ in 0..MAX_ISM_ROUTING_DEPTH {
            match self.ism_module_type(chain_id, ism).await? {
                ISM_MODULE_TYPE_MESSAGE_ID_MULTISIG => return Ok(ism),
                ISM_MODULE_TYPE_ROUTING => {
                    ism = IRoutingIsm::new(ism, client.provider())
                        .route(message.clone())
                        .call()
                        .await?;
                }
                module_type => {
                    return Err(HyperlaneClientError::UnsupportedIsm { address: ism, module_type });
                }
            }
        }

        Err(HyperlaneClientError::IsmRoutingTooDeep(recipient))
    }

    fn process_request(
        client: &EvmChainClient,
        hyperlane: &HyperlaneChainConfig,
        message: &Bytes,
        metadata: &Bytes,
    ) -> (Bytes, TransactionRequest) {
        let calldata = IMailbox::new(hyperlane.mailbox, client.provider())
            .process(metadata.clone(), message.clone())
            .calldata()
            .clone();
        let mut request =
            TransactionRequest::default().with_to(hyperlane.mailbox).with_input(calldata.clone());
        if let Some(from) = client.signer_address() {
            request = request.with_from(from);
        }
        (calldata, request)
    }
}

#[async_trait]
impl HyperlaneClient for EvmHyperlaneClient {
    async fn has_been_delivered(
        &self,
        chain_id: &str,
        message_id: B256,
    ) -> Result<bool, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        Ok(IMailbox::new(hyperlane.mailbox, client.provider()).delivered(message_id).call().await?)
    }

    async fn ism_module_type(
        &self,
        chain_id: &str,
        ism: Address,
    ) -> Result<u8, HyperlaneClientError> {
        let (client, _) = self.chain(chain_id).await?;
        Ok(IInterchainSecurityModule::new(ism, client.provider()).moduleType().call().await?)
    }

    #[instrument(skip(self, message))]
    async fn validators_and_threshold(
        &self,
        chain_id: &str,
        recipient: Address,
        message: &Bytes,
    ) -> Result<(Vec<Address>, u8), HyperlaneClientError> {
        let ism = self.resolve_multisig_ism(chain_id, recipient, message).await?;
        let (client, _) = self.chain(chain_id).await?;
        let result = IMultisigIsm::new(ism, client.provider())
            .validatorsAndThreshold(message.clone())
            .call()
            .await?;

        debug!(%ism, validators = result.validators.len(), threshold = result.threshold, "Resolved ism");
        Ok((result.validators, result.threshold))
    }

    async fn validator_storage_locations(
        &self,
        chain_id: &str,
        validators: &[Address],
    ) -> Result<Vec<Vec<String>>, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        Ok(IValidatorAnnounce::new(hyperlane.validator_announce, client.provider())
            .getAnnouncedStorageLocations(validators.to_vec())
            .call()
            .await?)
    }

    async fn merkle_tree_leaf_count(&self, chain_id: &str) -> Result<u32, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        Ok(IMerkleTreeHook::new(hyperlane.merkle_tree_hook, client.provider()).count().call().await?)
    }

    #[instrument(skip(self, message, metadata))]
    async fn process(
        &self,
        chain_id: &str,
        message: &Bytes,
        metadata: &Bytes,
    ) -> Result<SentTx, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        let (calldata, _) = Self::process_request(&client, &hyperlane, message, metadata);
        Ok(client.send(hyperlane.mailbox, calldata, U256::ZERO).await?)
    }

    async fn is_contract(
        &self,
        chain_id: &str,
        address: Address,
    ) -> Result<bool, HyperlaneClientError> {
        let (client, _) = self.chain(chain_id).await?;
        Ok(!client.provider().get_code_at(address).await?.is_empty())
    }

    #[instrument(skip(self))]
    async fn dispatch(
        &self,
        chain_id: &str,
        tx_hash: &str,
    ) -> Result<DispatchedMessage, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        let hash: B256 = tx_hash
            .parse()
            .map_err(|_| HyperlaneClientError::DispatchNotFound(tx_hash.to_string()))?;
        let receipt = client
            .provider()
            .get_transaction_receipt(hash)
            .await?
            .ok_or_else(|| HyperlaneClientError::ReceiptNotFound(tx_hash.to_string()))?;

        let mut dispatch = None;
        let mut message_id = None;
        let mut inserted = Vec::new();
        for log in receipt.inner.logs() {
            if log.address() == hyperlane.mailbox {
                if let Ok(event) = IMailbox::Dispatch::decode_log(&log.inner) {
                    dispatch.get_or_insert(event.data);
                } else if let Ok(event) = IMailbox::DispatchId::decode_log(&log.inner) {
                    message_id.get_or_insert(event.messageId);
                }
            } else if log.address() == hyperlane.merkle_tree_hook
                && let Ok(event) = IMerkleTreeHook::InsertedIntoTree::decode_log(&log.inner)
            {
                inserted.push(event.data);
            }
        }

        let not_found = || HyperlaneClientError::DispatchNotFound(tx_hash.to_string());
        let dispatch = dispatch.ok_or_else(not_found)?;
        let message_id = message_id.ok_or_else(not_found)?;
        let index = inserted
            .iter()
            .find(|event| event.messageId == message_id)
            .map(|event| event.index)
            .ok_or_else(not_found)?;

        Ok(DispatchedMessage {
            origin_domain: client.domain(),
            destination_domain: dispatch.destination,
            sender: dispatch.sender,
            recipient: dispatch.recipient,
            message_id,
            message: dispatch.message,
            index,
        })
    }

    #[instrument(skip(self, message, metadata))]
    async fn quote_process_uusdc(
        &self,
        chain_id: &str,
        message: &Bytes,
        metadata: &Bytes,
    ) -> Result<U256, HyperlaneClientError> {
        let (client, hyperlane) = self.chain(chain_id).await?;
        let price = client
            .config()
            .gas_token_price_uusdc
            .ok_or_else(|| HyperlaneClientError::MissingGasTokenPrice(chain_id.to_string()))?;

        let (_, request) = Self::process_request(&client, &hyperlane, message, metadata);
        let gas = client.provider().estimate_gas(request).await?;
        let gas_price = client.provider().get_gas_price().await?;

        let fee_wei = U256::from(gas) * U256::from(gas_price);
        let fee = fee_wei * price / WEI_PER_TOKEN;
        debug!(gas, gas_price, %fee, "Quoted process fee");
        Ok(fee)
    }
}
