//! EVM chain client.

use super::{
    ChainClient, ChainError, SentTx, SettlementRequest, TxResult,
    contracts::{FastTransferOrder, IERC20, IFastTransferGateway, pack_order_ids},
};
use crate::{
    config::{ChainConfig, ChainType},
    types::{OnChainOrderStatus, Order, OrderFill},
};
use alloy::{
    consensus::{TxEip1559, TypedTransaction},
    eips::{BlockId, Encodable2718},
    network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder},
    primitives::{Address, B256, Bytes, TxKind, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::{
        client::ClientBuilder,
        types::{Filter, TransactionRequest},
    },
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
    transports::layers::RetryBackoffLayer,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// [`RetryBackoffLayer`] used for chain providers.
///
/// We are allowing max 10 retries with a backoff of 800ms. The CU/s is set to max value to avoid
/// any throttling.
const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// [`ChainClient`] for EVM chains.
#[derive(Debug, Clone)]
pub struct EvmChainClient {
    config: ChainConfig,
    evm_chain_id: u64,
    provider: DynProvider,
    wallet: Option<EthereumWallet>,
}

impl EvmChainClient {
    /// Creates a client for `config`. Transactions can only be sent if a signer is given.
    pub fn new(config: ChainConfig, signer: Option<PrivateKeySigner>) -> Result<Self, ChainError> {
        let evm_chain_id = config
            .chain_id
            .parse()
            .map_err(|_| ChainError::InvalidChainId(config.chain_id.clone()))?;
        let client = ClientBuilder::default().layer(RETRY_LAYER).http(config.endpoint.clone());
        let provider = ProviderBuilder::new().connect_client(client).erased();

        Ok(Self { config, evm_chain_id, provider, wallet: signer.map(EthereumWallet::new) })
    }

    /// Chain configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Provider for the chain.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Address of the signer, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.wallet.as_ref().map(NetworkWallet::<Ethereum>::default_signer_address)
    }

    fn gateway(
        &self,
    ) -> Result<IFastTransferGateway::IFastTransferGatewayInstance<&DynProvider>, ChainError> {
        self.gateway_at(&self.config.fast_transfer_gateway)
    }

    fn gateway_at(
        &self,
        gateway: &str,
    ) -> Result<IFastTransferGateway::IFastTransferGatewayInstance<&DynProvider>, ChainError> {
        Ok(IFastTransferGateway::new(parse_address(gateway)?, &self.provider))
    }

    /// Signs and broadcasts a call to `to`.
    ///
    /// Gas is estimated against the pending state, so a call that would revert fails with
    /// [`ChainError::Reverted`] before anything is broadcast.
    #[instrument(skip(self, input), fields(chain_id = %self.config.chain_id))]
    pub async fn send(&self, to: Address, input: Bytes, value: U256) -> Result<SentTx, ChainError> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| ChainError::MissingSigner(self.config.chain_id.clone()))?;
        let from = NetworkWallet::<Ethereum>::default_signer_address(wallet);

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(input.clone())
            .with_value(value);
        let gas_limit = self.provider.estimate_gas(request).await?;
        let fees = self.provider.estimate_eip1559_fees().await?;
        let nonce = self.provider.get_transaction_count(from).pending().await?;

        let tx = TypedTransaction::Eip1559(TxEip1559 {
            chain_id: self.evm_chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: TxKind::Call(to),
            value,
            input,
            ..Default::default()
        });

        let signed = NetworkWallet::<Ethereum>::sign_transaction_from(wallet, from, tx).await?;
        let raw = signed.encoded_2718();
        let pending = self.provider.send_raw_transaction(&raw).await?;
        let tx_hash = pending.tx_hash().to_string();

        debug!(%tx_hash, nonce, gas_limit, "Sent transaction");
        Ok(SentTx { tx_hash, raw_tx: raw.into() })
    }

    /// Hyperlane domain of this chain.
    pub fn domain(&self) -> u32 {
        self.config.hyperlane_domain
    }

    fn fast_transfer_order(
        &self,
        order: &Order,
        source_domain: u32,
    ) -> Result<FastTransferOrder, ChainError> {
        FastTransferOrder::from_order(order, source_domain, self.domain())
            .ok_or(ChainError::InvalidOrder(order.order_id))
    }
}

/// Parses a hex EVM address.
pub(crate) fn parse_address(address: &str) -> Result<Address, ChainError> {
    address.parse().map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

/// Total fee of a receipt, in wei.
fn gas_cost(gas_used: u64, effective_gas_price: u128) -> U256 {
    U256::from(gas_used).saturating_mul(U256::from(effective_gas_price))
}

fn parse_tx_hash(tx_hash: &str) -> Result<B256, ChainError> {
    tx_hash.parse().map_err(|_| ChainError::InvalidResponse(format!("invalid tx hash {tx_hash}")))
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn balance(&self, address: &str, token: Option<&str>) -> Result<U256, ChainError> {
        let owner = parse_address(address)?;
        match token {
            None => Ok(self.provider.get_balance(owner).await?),
            Some(token) => Ok(IERC20::new(parse_address(token)?, &self.provider)
                .balanceOf(owner)
                .call()
                .await?),
        }
    }

    #[instrument(skip_all, fields(chain_id = %self.config.chain_id, order_id = %order.order_id))]
    async fn submit_fill(&self, order: &Order, source_domain: u32) -> Result<SentTx, ChainError> {
        let filler = self
            .signer_address()
            .ok_or_else(|| ChainError::MissingSigner(self.config.chain_id.clone()))?;
        let gateway = self.gateway()?;
        let call = gateway.fillOrder(filler, self.fast_transfer_order(order, source_domain)?);

        self.send(*gateway.address(), call.calldata().clone(), U256::ZERO).await
    }

    #[instrument(skip_all, fields(chain_id = %self.config.chain_id, order_id = %order.order_id))]
    async fn submit_timeout(
        &self,
        order: &Order,
        source_domain: u32,
    ) -> Result<SentTx, ChainError> {
        let gateway = self.gateway()?;
        let orders = vec![self.fast_transfer_order(order, source_domain)?];
        let fee = gateway.quoteInitiateTimeout(source_domain, orders.clone()).call().await?;
        let call = gateway.initiateTimeout(orders);

        self.send(*gateway.address(), call.calldata().clone(), fee).await
    }

    #[instrument(skip_all, fields(chain_id = %self.config.chain_id, orders = request.order_ids.len()))]
    async fn initiate_batch_settlement(
        &self,
        request: &SettlementRequest,
    ) -> Result<SentTx, ChainError> {
        let gateway = self.gateway()?;
        let order_ids = pack_order_ids(&request.order_ids);
        let fee = gateway
            .quoteInitiateSettlement(
                request.source_domain,
                request.repayment_address,
                order_ids.clone(),
            )
            .call()
            .await?;
        let call = gateway.initiateSettlement(request.repayment_address, order_ids);

        self.send(*gateway.address(), call.calldata().clone(), fee).await
    }

    async fn order_exists(
        &self,
        gateway: &str,
        order_id: B256,
        block: Option<u64>,
    ) -> Result<(bool, U256), ChainError> {
        let gateway = self.gateway_at(gateway)?;
        let mut call = gateway.orderExists(order_id);
        if let Some(block) = block {
            call = call.block(BlockId::number(block));
        }
        let result = call.call().await?;

        Ok((result.exists, result.amountIn))
    }

    async fn order_status(
        &self,
        gateway: &str,
        order_id: B256,
    ) -> Result<OnChainOrderStatus, ChainError> {
        let status = self.gateway_at(gateway)?.orderStatuses(order_id).call().await?;
        match status {
            0 => Ok(OnChainOrderStatus::Unfilled),
            1 => Ok(OnChainOrderStatus::Filled),
            2 => Ok(OnChainOrderStatus::Refunded),
            other => Err(ChainError::InvalidResponse(format!("unknown order status {other}"))),
        }
    }

    #[instrument(skip(self), fields(chain_id = %self.config.chain_id))]
    async fn order_fills_by_filler(&self, filler: &str) -> Result<Vec<OrderFill>, ChainError> {
        let gateway = self.gateway()?;
        let filler_word = parse_address(filler)?.into_word();
        let latest = self.provider.get_block_number().await?;
        let page_size = self.config.fill_scan_page_size.max(1);

        let mut fills = Vec::new();
        let mut from = self.config.fill_scan_start_block;
        while from <= latest {
            let to = latest.min(from.saturating_add(page_size - 1));
            let logs = self
                .provider
                .get_logs(
                    &Filter::new()
                        .address(*gateway.address())
                        .event_signature(IFastTransferGateway::OrderFilled::SIGNATURE_HASH)
                        .topic2(filler_word)
                        .from_block(from)
                        .to_block(to),
                )
                .await?;

            for log in logs {
                let Ok(event) = IFastTransferGateway::OrderFilled::decode_log(&log.inner) else {
                    continue;
                };
                let fill = gateway.orderFills(event.orderId).call().await?;
                fills.push(OrderFill {
                    order_id: event.orderId,
                    source_domain: fill.sourceDomain,
                    filler: event.filler.to_string(),
                    tx_hash: log.transaction_hash.map(|hash| hash.to_string()).unwrap_or_default(),
                });
            }

            from = to + 1;
        }

        debug!(
            fills = fills.len(),
            from = self.config.fill_scan_start_block,
            to = latest,
            "Scanned fills"
        );
        Ok(fills)
    }

    async fn order_fill(&self, order_id: B256) -> Result<Option<OrderFill>, ChainError> {
        let fill = self.gateway()?.orderFills(order_id).call().await?;
        if fill.filler == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(OrderFill {
            order_id,
            source_domain: fill.sourceDomain,
            filler: fill.filler.to_string(),
            tx_hash: String::new(),
        }))
    }

    async fn tx_result(&self, tx_hash: &str) -> Result<Option<TxResult>, ChainError> {
        let Some(receipt) = self.provider.get_transaction_receipt(parse_tx_hash(tx_hash)?).await?
        else {
            return Ok(None);
        };

        let success = receipt.status();
        Ok(Some(TxResult {
            gas_cost: gas_cost(receipt.gas_used, receipt.effective_gas_price),
            success,
            failure_reason: (!success).then(|| format!("transaction {tx_hash} reverted")),
        }))
    }
}
