//! Chain clients.
//!
//! Every chain the solver touches is served by a [`ChainClient`]. The EVM implementation talks to
//! the fast transfer gateway through alloy. Cosmos and SVM chains are served by
//! [`UnsupportedChainClient`], whose operations all fail with [`ChainError::NotImplemented`].

pub mod contracts;
mod evm;
pub use evm::EvmChainClient;

use crate::{
    config::{ChainType, ConfigError, SolverConfig},
    types::{ChainId, OnChainOrderStatus, Order, OrderFill},
};
use alloy::{
    primitives::{B256, Bytes, U256},
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug, sync::Arc};
use tokio::sync::Mutex;

/// Errors returned by [`ChainClient`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The chain type does not support the operation.
    #[error("{operation} is not implemented for {chain_type} chain {chain_id}")]
    NotImplemented {
        /// Chain id.
        chain_id: ChainId,
        /// Chain type.
        chain_type: ChainType,
        /// Operation name.
        operation: &'static str,
    },
    /// Execution reverted on chain.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// A transaction was requested from a client without a signer.
    #[error("no signer configured for chain {0}")]
    MissingSigner(ChainId),
    /// An address could not be parsed for the chain.
    #[error("invalid address {0}")]
    InvalidAddress(String),
    /// The order cannot be encoded for the gateway.
    #[error("order {0} cannot be encoded")]
    InvalidOrder(B256),
    /// The chain returned a value the solver does not understand.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The configured chain id is not numeric.
    #[error("invalid evm chain id {0}")]
    InvalidChainId(ChainId),
    /// Configuration lookup failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An RPC request failed.
    #[error(transparent)]
    Transport(TransportError),
    /// A contract call failed.
    #[error(transparent)]
    Contract(alloy::contract::Error),
    /// Signing failed.
    #[error(transparent)]
    Signer(#[from] alloy::signers::Error),
}

impl ChainError {
    /// Returns true if the error is an on-chain execution revert.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

/// Extracts an `execution reverted` JSON-RPC error message, if that is what `err` is.
pub(crate) fn revert_message(err: &TransportError) -> Option<String> {
    err.as_error_resp()
        .filter(|payload| payload.message.contains("execution reverted"))
        .map(|payload| payload.message.to_string())
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match revert_message(&err) {
            Some(message) => Self::Reverted(message),
            None => Self::Transport(err),
        }
    }
}

impl From<alloy::contract::Error> for ChainError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(err) => err.into(),
            err => Self::Contract(err),
        }
    }
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    /// Transaction hash.
    pub tx_hash: String,
    /// Raw signed transaction.
    pub raw_tx: Bytes,
}

/// Outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Total fee paid, in the chain's native base unit.
    pub gas_cost: U256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Failure reason, if execution failed.
    pub failure_reason: Option<String>,
}

/// A batch settlement to submit on the chain the orders were filled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    /// Hyperlane domain of the chain the orders were submitted on.
    pub source_domain: u32,
    /// Solver address on the source chain that receives the repayment.
    pub repayment_address: B256,
    /// Settled orders.
    pub order_ids: Vec<B256>,
}

/// Capability set of a chain.
///
/// Every operation has a default implementation that fails with [`ChainError::NotImplemented`],
/// so that chain types without support for an operation fail loudly.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Chain id.
    fn chain_id(&self) -> &str;

    /// Chain type.
    fn chain_type(&self) -> ChainType;

    /// Returns the latest block height.
    async fn block_height(&self) -> Result<u64, ChainError> {
        Err(self.not_implemented("block_height"))
    }

    /// Returns the balance of `address`, in the native token if `token` is `None`.
    async fn balance(&self, address: &str, token: Option<&str>) -> Result<U256, ChainError> {
        let _ = (address, token);
        Err(self.not_implemented("balance"))
    }

    /// Fills `order` on this chain.
    async fn submit_fill(&self, order: &Order, source_domain: u32) -> Result<SentTx, ChainError> {
        let _ = (order, source_domain);
        Err(self.not_implemented("submit_fill"))
    }

    /// Initiates the timeout of an unfilled, expired `order` on this chain.
    async fn submit_timeout(
        &self,
        order: &Order,
        source_domain: u32,
    ) -> Result<SentTx, ChainError> {
        let _ = (order, source_domain);
        Err(self.not_implemented("submit_timeout"))
    }

    /// Initiates the settlement of a batch of orders filled on this chain.
    async fn initiate_batch_settlement(
        &self,
        request: &SettlementRequest,
    ) -> Result<SentTx, ChainError> {
        let _ = request;
        Err(self.not_implemented("initiate_batch_settlement"))
    }

    /// Returns true once the gateway on this chain considers the order settled.
    async fn is_settlement_complete(
        &self,
        gateway: &str,
        order_id: B256,
    ) -> Result<bool, ChainError> {
        Ok(self.order_status(gateway, order_id).await? == OnChainOrderStatus::Filled)
    }

    /// Returns whether the order exists at `gateway` as of `block`, and its amount.
    async fn order_exists(
        &self,
        gateway: &str,
        order_id: B256,
        block: Option<u64>,
    ) -> Result<(bool, U256), ChainError> {
        let _ = (gateway, order_id, block);
        Err(self.not_implemented("order_exists"))
    }

    /// Returns the status of the order at `gateway`.
    async fn order_status(
        &self,
        gateway: &str,
        order_id: B256,
    ) -> Result<OnChainOrderStatus, ChainError> {
        let _ = (gateway, order_id);
        Err(self.not_implemented("order_status"))
    }

    /// Returns all fills made by `filler` on this chain's gateway.
    async fn order_fills_by_filler(&self, filler: &str) -> Result<Vec<OrderFill>, ChainError> {
        let _ = filler;
        Err(self.not_implemented("order_fills_by_filler"))
    }

    /// Returns the fill of `order_id` on this chain's gateway, if it was filled.
    async fn order_fill(&self, order_id: B256) -> Result<Option<OrderFill>, ChainError> {
        let _ = order_id;
        Err(self.not_implemented("order_fill"))
    }

    /// Returns the result of an included transaction, or `None` if it is not included yet.
    async fn tx_result(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError> {
        let _ = tx_hash;
        Err(self.not_implemented("tx_result"))
    }

    /// Builds the error returned by unsupported operations.
    fn not_implemented(&self, operation: &'static str) -> ChainError {
        ChainError::NotImplemented {
            chain_id: self.chain_id().to_string(),
            chain_type: self.chain_type(),
            operation,
        }
    }
}

/// Client for chain types the solver has no implementation for.
#[derive(Debug, Clone)]
pub struct UnsupportedChainClient {
    chain_id: ChainId,
    chain_type: ChainType,
}

impl UnsupportedChainClient {
    /// Creates a new client.
    pub fn new(chain_id: ChainId, chain_type: ChainType) -> Self {
        Self { chain_id, chain_type }
    }
}

#[async_trait]
impl ChainClient for UnsupportedChainClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        self.chain_type
    }
}

/// Lazily created, cached chain clients, one per chain id.
#[derive(Debug, Clone)]
pub struct ChainClients {
    config: Arc<SolverConfig>,
    signer: Option<PrivateKeySigner>,
    clients: Arc<Mutex<HashMap<ChainId, Arc<dyn ChainClient>>>>,
}

impl ChainClients {
    /// Creates an empty cache. Clients are created on first use.
    pub fn new(config: Arc<SolverConfig>, signer: Option<PrivateKeySigner>) -> Self {
        Self { config, signer, clients: Default::default() }
    }

    /// Creates a cache pre-populated with `clients`.
    pub fn with_clients(
        config: Arc<SolverConfig>,
        clients: impl IntoIterator<Item = Arc<dyn ChainClient>>,
    ) -> Self {
        let clients =
            clients.into_iter().map(|client| (client.chain_id().to_string(), client)).collect();
        Self { config, signer: None, clients: Arc::new(Mutex::new(clients)) }
    }

    /// The configuration clients are created from.
    pub fn config(&self) -> &Arc<SolverConfig> {
        &self.config
    }

    /// Returns the client of `chain_id`, creating it if needed.
    pub async fn client(&self, chain_id: &str) -> Result<Arc<dyn ChainClient>, ChainError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(chain_id) {
            return Ok(client.clone());
        }

        let chain = self.config.chain(chain_id)?;
        let client: Arc<dyn ChainClient> = match chain.chain_type {
            ChainType::Evm => Arc::new(EvmChainClient::new(chain.clone(), self.signer.clone())?),
            chain_type => Arc::new(UnsupportedChainClient::new(chain.chain_id.clone(), chain_type)),
        };
        clients.insert(chain.chain_id.clone(), client.clone());

        Ok(client)
    }
}
