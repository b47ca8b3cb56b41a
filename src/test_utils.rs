//! Test helpers and in-memory doubles of the external collaborators.

use crate::{
    chains::{ChainClient, ChainError, SentTx, SettlementRequest, TxResult},
    config::ChainType,
    hyperlane::{
        CheckpointError, DispatchedMessage, HyperlaneClient, HyperlaneClientError,
        checkpoint::{CheckpointWithMessageId, SignatureParts, SignedCheckpointWithMessageId},
        fetcher::{CheckpointFetcher, FetcherFactory},
    },
    types::{OnChainOrderStatus, Order, OrderFill, OrderStatus},
};
use alloy::{
    primitives::{Address, B256, Bytes, U256},
    rpc::json_rpc::ErrorPayload,
    signers::{SignerSync, local::PrivateKeySigner},
    transports::{TransportError, TransportErrorKind},
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// A pending order from `source` to `destination` that times out in an hour.
pub(crate) fn order(source: &str, destination: &str) -> Order {
    Order {
        order_id: B256::random(),
        source_chain_id: source.to_string(),
        destination_chain_id: destination.to_string(),
        source_chain_gateway: "0xe7935104c9670015b21c6300e5b95d2f75474cda".to_string(),
        sender: Address::repeat_byte(0x5e).to_vec().into(),
        recipient: Address::repeat_byte(0x7e).to_vec().into(),
        amount_in: U256::from(1_000_100),
        amount_out: U256::from(1_000_000),
        nonce: 1,
        timeout_timestamp: Utc::now() + chrono::Duration::hours(1),
        order_creation_tx: B256::random().to_string(),
        order_creation_tx_block_height: 100,
        data: None,
        status: OrderStatus::Pending,
        fill_tx: None,
        refund_tx: None,
    }
}

/// Signs `value` the way Hyperlane validators do.
pub(crate) fn sign_checkpoint(
    signer: &PrivateKeySigner,
    value: CheckpointWithMessageId,
) -> SignedCheckpointWithMessageId {
    let signature = signer.sign_message_sync(value.digest().as_slice()).unwrap();
    let parts = SignatureParts { r: signature.r(), s: signature.s(), v: 27 + signature.v() as u64 };
    let serialized = parts.to_bytes().unwrap();

    SignedCheckpointWithMessageId {
        value,
        signature: parts,
        serialized_signature: Some(Bytes::copy_from_slice(&serialized)),
    }
}

/// A JSON-RPC error response carrying `message`.
pub(crate) fn error_resp(message: &str) -> TransportError {
    let payload: ErrorPayload =
        serde_json::from_value(serde_json::json!({ "code": 3, "message": message })).unwrap();
    TransportError::ErrorResp(payload)
}

fn random_tx() -> SentTx {
    SentTx { tx_hash: B256::random().to_string(), raw_tx: Bytes::from_static(&[0x02, 0x01]) }
}

/// A [`ChainClient`] backed by in-memory gateway state.
#[derive(Debug, Default)]
pub(crate) struct MockChainClient {
    chain_id: String,
    block_height: u64,
    empty_raw_tx: bool,
    fail_settlements: bool,
    filler_fills: Vec<OrderFill>,
    fill_scan_down: AtomicBool,
    fills: Mutex<HashMap<B256, OrderFill>>,
    orders: Mutex<HashMap<B256, U256>>,
    statuses: Mutex<HashMap<B256, OnChainOrderStatus>>,
    tx_results: Mutex<HashMap<String, TxResult>>,
    submitted_fills: Mutex<Vec<B256>>,
    submitted_timeouts: Mutex<Vec<B256>>,
    settlements: Mutex<Vec<(SettlementRequest, SentTx)>>,
}

impl MockChainClient {
    pub(crate) fn new(chain_id: &str) -> Self {
        Self { chain_id: chain_id.to_string(), block_height: 1_000, ..Default::default() }
    }

    /// Settlement transactions come back without raw bytes.
    pub(crate) fn with_empty_raw_tx(mut self) -> Self {
        self.empty_raw_tx = true;
        self
    }

    /// Settlement submissions revert.
    pub(crate) fn with_failing_settlements(mut self) -> Self {
        self.fail_settlements = true;
        self
    }

    /// Fills returned when listing fills by filler.
    pub(crate) fn with_filler_fills(mut self, fills: Vec<OrderFill>) -> Self {
        self.filler_fills = fills;
        self
    }

    /// Makes listing fills by filler fail while `down`.
    pub(crate) fn set_fill_scan_down(&self, down: bool) {
        self.fill_scan_down.store(down, Ordering::Relaxed);
    }

    /// Stores an order in the gateway.
    pub(crate) fn set_order(&self, order_id: B256, amount: U256, status: OnChainOrderStatus) {
        self.orders.lock().unwrap().insert(order_id, amount);
        self.statuses.lock().unwrap().insert(order_id, status);
    }

    pub(crate) fn set_status(&self, order_id: B256, status: OnChainOrderStatus) {
        self.statuses.lock().unwrap().insert(order_id, status);
    }

    pub(crate) fn set_fill(&self, fill: OrderFill) {
        self.fills.lock().unwrap().insert(fill.order_id, fill);
    }

    pub(crate) fn set_tx_result(&self, tx_hash: &str, result: TxResult) {
        self.tx_results.lock().unwrap().insert(tx_hash.to_string(), result);
    }

    pub(crate) fn submitted_fills(&self) -> Vec<B256> {
        self.submitted_fills.lock().unwrap().clone()
    }

    pub(crate) fn submitted_timeouts(&self) -> Vec<B256> {
        self.submitted_timeouts.lock().unwrap().clone()
    }

    pub(crate) fn settlements(&self) -> Vec<(SettlementRequest, SentTx)> {
        self.settlements.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self.block_height)
    }

    async fn submit_fill(&self, order: &Order, _source_domain: u32) -> Result<SentTx, ChainError> {
        self.submitted_fills.lock().unwrap().push(order.order_id);
        Ok(random_tx())
    }

    async fn submit_timeout(
        &self,
        order: &Order,
        _source_domain: u32,
    ) -> Result<SentTx, ChainError> {
        self.submitted_timeouts.lock().unwrap().push(order.order_id);
        Ok(random_tx())
    }

    async fn initiate_batch_settlement(
        &self,
        request: &SettlementRequest,
    ) -> Result<SentTx, ChainError> {
        if self.fail_settlements {
            return Err(ChainError::Reverted("execution reverted".to_string()));
        }
        let mut tx = random_tx();
        if self.empty_raw_tx {
            tx.raw_tx = Bytes::new();
        }
        self.settlements.lock().unwrap().push((request.clone(), tx.clone()));
        Ok(tx)
    }

    async fn order_exists(
        &self,
        _gateway: &str,
        order_id: B256,
        _block: Option<u64>,
    ) -> Result<(bool, U256), ChainError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(&order_id)
            .map(|amount| (true, *amount))
            .unwrap_or((false, U256::ZERO)))
    }

    async fn order_status(
        &self,
        _gateway: &str,
        order_id: B256,
    ) -> Result<OnChainOrderStatus, ChainError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&order_id)
            .copied()
            .unwrap_or(OnChainOrderStatus::Unfilled))
    }

    async fn order_fills_by_filler(&self, _filler: &str) -> Result<Vec<OrderFill>, ChainError> {
        if self.fill_scan_down.load(Ordering::Relaxed) {
            return Err(TransportErrorKind::custom_str("connection refused").into());
        }
        Ok(self.filler_fills.clone())
    }

    async fn order_fill(&self, order_id: B256) -> Result<Option<OrderFill>, ChainError> {
        Ok(self.fills.lock().unwrap().get(&order_id).cloned())
    }

    async fn tx_result(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError> {
        Ok(self.tx_results.lock().unwrap().get(tx_hash).cloned())
    }
}

/// A [`HyperlaneClient`] serving canned dispatches and recording deliveries.
#[derive(Debug)]
pub(crate) struct MockHyperlaneClient {
    dispatches: HashMap<String, DispatchedMessage>,
    validators: Vec<Address>,
    threshold: u8,
    locations: Vec<Vec<String>>,
    leaf_count: u32,
    quote: Option<U256>,
    non_contract_recipients: bool,
    process_revert: bool,
    delivered: Mutex<HashSet<B256>>,
    processed: Mutex<Vec<(String, Bytes, Bytes, SentTx)>>,
    dispatch_calls: AtomicUsize,
    process_calls: AtomicUsize,
}

impl Default for MockHyperlaneClient {
    fn default() -> Self {
        Self {
            dispatches: HashMap::new(),
            validators: Vec::new(),
            threshold: 1,
            locations: Vec::new(),
            leaf_count: 0,
            quote: Some(U256::from(1_000)),
            non_contract_recipients: false,
            process_revert: false,
            delivered: Default::default(),
            processed: Default::default(),
            dispatch_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
        }
    }
}

impl MockHyperlaneClient {
    pub(crate) fn with_dispatch(
        mut self,
        tx_hash: impl Into<String>,
        dispatch: DispatchedMessage,
    ) -> Self {
        self.dispatches.insert(tx_hash.into(), dispatch);
        self
    }

    pub(crate) fn with_validators(mut self, validators: Vec<Address>, threshold: u8) -> Self {
        self.validators = validators;
        self.threshold = threshold;
        self
    }

    pub(crate) fn with_locations(mut self, locations: Vec<Vec<String>>) -> Self {
        self.locations = locations;
        self
    }

    pub(crate) fn with_leaf_count(mut self, leaf_count: u32) -> Self {
        self.leaf_count = leaf_count;
        self
    }

    /// Quoted delivery fee, `None` makes the quote revert.
    pub(crate) fn with_quote(mut self, quote: Option<U256>) -> Self {
        self.quote = quote;
        self
    }

    pub(crate) fn with_non_contract_recipients(mut self) -> Self {
        self.non_contract_recipients = true;
        self
    }

    pub(crate) fn with_process_revert(mut self) -> Self {
        self.process_revert = true;
        self
    }

    pub(crate) fn with_delivered(self, message_id: B256) -> Self {
        self.deliver(message_id);
        self
    }

    pub(crate) fn deliver(&self, message_id: B256) {
        self.delivered.lock().unwrap().insert(message_id);
    }

    /// Delivered `(chain id, message, metadata)` triples.
    pub(crate) fn processed(&self) -> Vec<(String, Bytes, Bytes)> {
        self.processed
            .lock()
            .unwrap()
            .iter()
            .map(|(chain_id, message, metadata, _)| {
                (chain_id.clone(), message.clone(), metadata.clone())
            })
            .collect()
    }

    pub(crate) fn processed_tx_hash(&self, i: usize) -> String {
        self.processed.lock().unwrap()[i].3.tx_hash.clone()
    }

    pub(crate) fn dispatch_calls(&self) -> usize {
        self.dispatch_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HyperlaneClient for MockHyperlaneClient {
    async fn has_been_delivered(
        &self,
        _chain_id: &str,
        message_id: B256,
    ) -> Result<bool, HyperlaneClientError> {
        Ok(self.delivered.lock().unwrap().contains(&message_id))
    }

    async fn ism_module_type(
        &self,
        _chain_id: &str,
        _ism: Address,
    ) -> Result<u8, HyperlaneClientError> {
        Ok(crate::constants::ISM_MODULE_TYPE_MESSAGE_ID_MULTISIG)
    }

    async fn validators_and_threshold(
        &self,
        _chain_id: &str,
        _recipient: Address,
        _message: &Bytes,
    ) -> Result<(Vec<Address>, u8), HyperlaneClientError> {
        Ok((self.validators.clone(), self.threshold))
    }

    async fn validator_storage_locations(
        &self,
        _chain_id: &str,
        validators: &[Address],
    ) -> Result<Vec<Vec<String>>, HyperlaneClientError> {
        Ok(self.locations.iter().take(validators.len()).cloned().collect())
    }

    async fn merkle_tree_leaf_count(&self, _chain_id: &str) -> Result<u32, HyperlaneClientError> {
        Ok(self.leaf_count)
    }

    async fn process(
        &self,
        chain_id: &str,
        message: &Bytes,
        metadata: &Bytes,
    ) -> Result<SentTx, HyperlaneClientError> {
        self.process_calls.fetch_add(1, Ordering::Relaxed);
        if self.process_revert {
            return Err(HyperlaneClientError::Reverted("execution reverted".to_string()));
        }
        let tx = random_tx();
        self.processed.lock().unwrap().push((
            chain_id.to_string(),
            message.clone(),
            metadata.clone(),
            tx.clone(),
        ));
        Ok(tx)
    }

    async fn is_contract(
        &self,
        _chain_id: &str,
        _address: Address,
    ) -> Result<bool, HyperlaneClientError> {
        Ok(!self.non_contract_recipients)
    }

    async fn dispatch(
        &self,
        _chain_id: &str,
        tx_hash: &str,
    ) -> Result<DispatchedMessage, HyperlaneClientError> {
        self.dispatch_calls.fetch_add(1, Ordering::Relaxed);
        self.dispatches
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| HyperlaneClientError::DispatchNotFound(tx_hash.to_string()))
    }

    async fn quote_process_uusdc(
        &self,
        _chain_id: &str,
        _message: &Bytes,
        _metadata: &Bytes,
    ) -> Result<U256, HyperlaneClientError> {
        self.quote.ok_or_else(|| HyperlaneClientError::Reverted("execution reverted".to_string()))
    }
}

/// A [`CheckpointFetcher`] serving one checkpoint for every index.
#[derive(Debug, Clone)]
pub(crate) struct MockFetcher {
    validator: Address,
    checkpoint: Option<SignedCheckpointWithMessageId>,
}

impl MockFetcher {
    pub(crate) fn new(validator: Address) -> Self {
        Self { validator, checkpoint: None }
    }

    pub(crate) fn with_checkpoint(
        mut self,
        checkpoint: Option<SignedCheckpointWithMessageId>,
    ) -> Self {
        self.checkpoint = checkpoint;
        self
    }
}

#[async_trait]
impl CheckpointFetcher for MockFetcher {
    fn validator(&self) -> Address {
        self.validator
    }

    async fn latest_index(&self) -> Result<Option<u32>, CheckpointError> {
        Ok(self.checkpoint.as_ref().map(SignedCheckpointWithMessageId::index))
    }

    async fn checkpoint(
        &self,
        _index: u32,
    ) -> Result<Option<SignedCheckpointWithMessageId>, CheckpointError> {
        Ok(self.checkpoint.clone())
    }
}

/// A [`FetcherFactory`] resolving locations to preconfigured fetchers.
#[derive(Debug, Default)]
pub(crate) struct MockFetcherFactory {
    fetchers: HashMap<String, Arc<dyn CheckpointFetcher>>,
}

impl MockFetcherFactory {
    pub(crate) fn with_fetcher(mut self, location: impl Into<String>, fetcher: MockFetcher) -> Self {
        self.fetchers.insert(location.into(), Arc::new(fetcher));
        self
    }
}

impl FetcherFactory for MockFetcherFactory {
    fn fetcher(
        &self,
        _validator: Address,
        location: &str,
    ) -> Result<Arc<dyn CheckpointFetcher>, CheckpointError> {
        self.fetchers
            .get(location)
            .cloned()
            .ok_or_else(|| CheckpointError::UnsupportedLocation(location.to_string()))
    }
}
