//! Solver configuration.
use crate::{
    constants::{
        DEFAULT_COOLDOWN_SWEEP_INTERVAL, DEFAULT_FILL_SCAN_PAGE_SIZE, DEFAULT_FULFILLMENT_POLL_INTERVAL,
        DEFAULT_FULFILLMENT_WORKERS, DEFAULT_METRICS_PORT, DEFAULT_QUEUE_CAPACITY,
        DEFAULT_REFUND_POLL_INTERVAL, DEFAULT_RELAYER_POLL_INTERVAL, DEFAULT_REQUEUE_DELAY,
        DEFAULT_SETTLEMENT_POLL_INTERVAL,
    },
    types::ChainId,
};
use alloy::primitives::{Address, U256};
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};
use strum::Display;
use url::Url;

/// Errors raised by configuration lookups and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No chain is configured with this id.
    #[error("no config for chain {0}")]
    UnknownChain(ChainId),
    /// No chain is configured with this Hyperlane domain.
    #[error("no config for hyperlane domain {0}")]
    UnknownDomain(u32),
    /// The chain has no Hyperlane deployment configured.
    #[error("chain {0} has no hyperlane config")]
    MissingHyperlane(ChainId),
    /// Two chains share an id.
    #[error("chain {0} is configured more than once")]
    DuplicateChain(ChainId),
    /// Two chains share a Hyperlane domain.
    #[error("hyperlane domain {0} is configured more than once")]
    DuplicateDomain(u32),
    /// The fulfillment worker pool must not be empty.
    #[error("fulfillment requires at least one worker")]
    NoWorkers,
}

/// Solver configuration.
///
/// Passed around as an explicit, read-only value. Chain metadata is looked up by chain id or
/// Hyperlane domain through [`SolverConfig::chain`] and [`SolverConfig::chain_by_domain`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Chain configurations.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Settlement engine configuration.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Fulfillment configuration.
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
    /// Hyperlane relayer configuration.
    #[serde(default)]
    pub relayer: RelayerConfig,
    /// Metrics exporter configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Database URL. An in-memory store is used if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Secrets.
    #[serde(skip)]
    pub secrets: SecretsConfig,
}

impl SolverConfig {
    /// Adds a chain.
    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.chains.push(chain);
        self
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, database_url: Option<String>) -> Self {
        if database_url.is_some() {
            self.database_url = database_url;
        }
        self
    }

    /// Sets the number of fulfillment workers.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers {
            self.fulfillment.workers = workers;
        }
        self
    }

    /// Enables or disables filling orders.
    pub fn with_fills(mut self, enable_fills: Option<bool>) -> Self {
        if let Some(enable_fills) = enable_fills {
            self.fulfillment.enable_fills = enable_fills;
        }
        self
    }

    /// Enables or disables initiating refunds for expired orders.
    pub fn with_refunds(mut self, enable_refunds: Option<bool>) -> Self {
        if let Some(enable_refunds) = enable_refunds {
            self.fulfillment.enable_refunds = enable_refunds;
        }
        self
    }

    /// Sets the address the metrics exporter listens on.
    pub fn with_metrics_address(mut self, address: Option<IpAddr>) -> Self {
        if let Some(address) = address {
            self.metrics.address = address;
        }
        self
    }

    /// Sets the port the metrics exporter listens on.
    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.metrics.port = port;
        }
        self
    }

    /// Sets the solver signing key.
    pub fn with_private_key(mut self, private_key: Option<String>) -> Self {
        self.secrets.solver_private_key = private_key;
        self
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut domains = HashSet::new();
        for chain in &self.chains {
            if !ids.insert(chain.chain_id.as_str()) {
                return Err(ConfigError::DuplicateChain(chain.chain_id.clone()));
            }
            if !domains.insert(chain.hyperlane_domain) {
                return Err(ConfigError::DuplicateDomain(chain.hyperlane_domain));
            }
        }
        if self.fulfillment.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Returns the configuration of `chain_id`.
    pub fn chain(&self, chain_id: &str) -> Result<&ChainConfig, ConfigError> {
        self.chains
            .iter()
            .find(|chain| chain.chain_id == chain_id)
            .ok_or_else(|| ConfigError::UnknownChain(chain_id.to_string()))
    }

    /// Returns the configuration of the chain with Hyperlane `domain`.
    pub fn chain_by_domain(&self, domain: u32) -> Result<&ChainConfig, ConfigError> {
        self.chains
            .iter()
            .find(|chain| chain.hyperlane_domain == domain)
            .ok_or(ConfigError::UnknownDomain(domain))
    }

    /// Returns the chains that have a fast transfer gateway deployed.
    pub fn gateway_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|chain| !chain.fast_transfer_gateway.is_empty())
    }
}

/// Kind of a chain, selecting which chain client implementation serves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainType {
    /// EVM chain.
    #[default]
    Evm,
    /// Cosmos SDK chain.
    Cosmos,
    /// Solana VM chain.
    Svm,
}

/// Chain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain id.
    pub chain_id: ChainId,
    /// Chain type.
    #[serde(default)]
    pub chain_type: ChainType,
    /// RPC endpoint.
    pub endpoint: Url,
    /// Hyperlane domain of the chain.
    pub hyperlane_domain: u32,
    /// Fast transfer gateway contract.
    #[serde(default)]
    pub fast_transfer_gateway: String,
    /// Address the solver fills and settles from.
    pub solver_address: String,
    /// Minimum value, in uusdc, a batch of settlements repaid on this chain must reach before it
    /// is settled.
    #[serde(default)]
    pub settle_up_threshold_uusdc: U256,
    /// Price in uusdc of one whole native gas token (1e18 base units).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_token_price_uusdc: Option<U256>,
    /// Block range scanned per request when listing fills.
    #[serde(default = "default_fill_scan_page_size")]
    pub fill_scan_page_size: u64,
    /// First block scanned when listing fills.
    #[serde(default)]
    pub fill_scan_start_block: u64,
    /// Hyperlane deployment on this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlane: Option<HyperlaneChainConfig>,
}

impl ChainConfig {
    /// Returns the Hyperlane deployment of this chain.
    pub fn hyperlane(&self) -> Result<&HyperlaneChainConfig, ConfigError> {
        self.hyperlane.as_ref().ok_or_else(|| ConfigError::MissingHyperlane(self.chain_id.clone()))
    }
}

fn default_fill_scan_page_size() -> u64 {
    DEFAULT_FILL_SCAN_PAGE_SIZE
}

/// Hyperlane contracts deployed on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperlaneChainConfig {
    /// Mailbox contract.
    pub mailbox: Address,
    /// Merkle tree hook contract.
    pub merkle_tree_hook: Address,
    /// Validator announce contract.
    pub validator_announce: Address,
}

/// Settlement engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Interval between engine ticks.
    #[serde(with = "crate::serde::duration")]
    pub poll_interval: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_SETTLEMENT_POLL_INTERVAL }
    }
}

/// Fulfillment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// Number of fill workers.
    pub workers: usize,
    /// Capacity of the order queue.
    pub queue_capacity: usize,
    /// Delay before a dequeued order may be enqueued again.
    #[serde(with = "crate::serde::duration")]
    pub requeue_delay: Duration,
    /// Interval between sweeps of expired cooldowns.
    #[serde(with = "crate::serde::duration")]
    pub cooldown_sweep_interval: Duration,
    /// Interval between polls for pending orders.
    #[serde(with = "crate::serde::duration")]
    pub poll_interval: Duration,
    /// Interval between polls for orders awaiting a refund.
    #[serde(with = "crate::serde::duration")]
    pub refund_poll_interval: Duration,
    /// Whether fill transactions are submitted.
    pub enable_fills: bool,
    /// Whether timeout transactions are submitted for expired orders.
    pub enable_refunds: bool,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_FULFILLMENT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            cooldown_sweep_interval: DEFAULT_COOLDOWN_SWEEP_INTERVAL,
            poll_interval: DEFAULT_FULFILLMENT_POLL_INTERVAL,
            refund_poll_interval: DEFAULT_REFUND_POLL_INTERVAL,
            enable_fills: true,
            enable_refunds: true,
        }
    }
}

/// Hyperlane relayer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// Interval between relayer runs.
    #[serde(with = "crate::serde::duration")]
    pub poll_interval: Duration,
    /// Maximum fee, in uusdc, paid to deliver a message. Unbounded if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_relay_fee_uusdc: Option<U256>,
    /// Age after which a transfer is relayed regardless of the fee cap.
    #[serde(with = "crate::serde::duration::option", skip_serializing_if = "Option::is_none")]
    pub profitable_relay_timeout: Option<Duration>,
    /// Storage locations used instead of the announced ones, by validator.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validator_storage_overrides: BTreeMap<Address, String>,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_RELAYER_POLL_INTERVAL,
            max_relay_fee_uusdc: None,
            profitable_relay_timeout: None,
            validator_storage_overrides: BTreeMap::new(),
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// The address to serve metrics on.
    pub address: IpAddr,
    /// The port to serve metrics on.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::LOCALHOST), port: DEFAULT_METRICS_PORT }
    }
}

/// Secrets (kept out of serialized output).
#[derive(Clone, Default)]
pub struct SecretsConfig {
    /// Hex encoded private key the solver signs transactions with.
    pub solver_private_key: Option<String>,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("solver_private_key", &self.solver_private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn example_config_round_trips() {
        let s = include_str!("../config.example.yaml");
        let config = serde_yaml::from_str::<SolverConfig>(s).unwrap();
        config.validate().unwrap();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let from_yaml = serde_yaml::from_str::<SolverConfig>(&yaml).unwrap();
        assert_eq!(from_yaml.chains, config.chains);
        assert_eq!(from_yaml.fulfillment, config.fulfillment);
        assert_eq!(from_yaml.relayer, config.relayer);
        assert_eq!(from_yaml.settlement, config.settlement);
    }

    #[test]
    fn example_config_values() {
        let config =
            serde_yaml::from_str::<SolverConfig>(include_str!("../config.example.yaml")).unwrap();

        let arbitrum = config.chain("42161").unwrap();
        assert_eq!(arbitrum.chain_type, ChainType::Evm);
        assert_eq!(arbitrum.settle_up_threshold_uusdc, U256::from(100_000_000u64));
        assert_eq!(config.chain_by_domain(42161).unwrap().chain_id, "42161");
        assert_eq!(
            arbitrum.hyperlane().unwrap().mailbox,
            address!("0x979Ca5202784112f4738403dBec5D0F3B9daabB9")
        );

        assert_eq!(config.relayer.profitable_relay_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.fulfillment.requeue_delay, Duration::from_secs(60));
        assert_eq!(config.chain("osmosis-1").unwrap().chain_type, ChainType::Cosmos);
        assert!(config.chain("osmosis-1").unwrap().hyperlane().is_err());
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = serde_yaml::from_str::<SolverConfig>("chains: []").unwrap();
        assert_eq!(config.fulfillment.workers, DEFAULT_FULFILLMENT_WORKERS);
        assert_eq!(config.fulfillment.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.settlement.poll_interval, DEFAULT_SETTLEMENT_POLL_INTERVAL);
        assert!(config.fulfillment.enable_fills);
        assert!(config.relayer.max_relay_fee_uusdc.is_none());
    }

    #[test]
    fn unknown_lookups_fail() {
        let config = SolverConfig::default();
        assert_eq!(config.chain("1"), Err(ConfigError::UnknownChain("1".to_string())));
        assert_eq!(config.chain_by_domain(1), Err(ConfigError::UnknownDomain(1)));
    }

    #[test]
    fn validate_rejects_duplicates_and_empty_pool() {
        let chain = ChainConfig {
            chain_id: "1".to_string(),
            chain_type: ChainType::Evm,
            endpoint: "http://localhost:8545".parse().unwrap(),
            hyperlane_domain: 1,
            fast_transfer_gateway: String::new(),
            solver_address: String::new(),
            settle_up_threshold_uusdc: U256::ZERO,
            gas_token_price_uusdc: None,
            fill_scan_page_size: DEFAULT_FILL_SCAN_PAGE_SIZE,
            fill_scan_start_block: 0,
            hyperlane: None,
        };

        let config = SolverConfig::default().with_chain(chain.clone()).with_chain(chain.clone());
        assert_eq!(config.validate(), Err(ConfigError::DuplicateChain("1".to_string())));

        let other = ChainConfig { chain_id: "2".to_string(), ..chain.clone() };
        let config = SolverConfig::default().with_chain(chain.clone()).with_chain(other);
        assert_eq!(config.validate(), Err(ConfigError::DuplicateDomain(1)));

        let config = SolverConfig::default().with_chain(chain).with_workers(Some(0));
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let config = SolverConfig::default().with_private_key(Some("0xdeadbeef".to_string()));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("deadbeef"));
        assert!(!format!("{config:?}").contains("deadbeef"));
    }
}
