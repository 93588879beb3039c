use std::fs;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use omnilaunch_types::{
    max_price_deviation_percent, DEFAULT_DEVIATION_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};

use crate::error::ServiceError;

/// Engine configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Reserve/graduation monitoring interval in seconds
    pub sync_interval_secs: u64,

    /// Price-deviation monitoring interval in seconds
    pub deviation_interval_secs: u64,

    /// Coefficient-of-variation ceiling (percent) for the deviation check
    #[serde(with = "rust_decimal::serde::str")]
    pub max_deviation_percent: Decimal,

    /// Retry configuration for chain-client calls
    pub retry: RetryConfig,

    /// Chains the engine talks to
    pub chains: Vec<ChainSettings>,
}

/// Configuration for one chain endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainSettings {
    /// Chain identifier used in deployment rows
    pub chain_id: String,

    /// Human-readable name for logging
    pub name: String,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Node-managed signer account; absent means the chain cannot submit
    /// transactions and bridge operations degrade to the local fallback
    pub signer_address: Option<String>,

    /// DEX factory for pool creation at graduation; absent disables
    /// graduation submission on this chain
    pub dex_factory_address: Option<String>,

    /// Event topic emitted by the bridge when a liquidity request is opened
    pub bridge_request_topic: String,

    /// Event topic emitted by the bridge when a delivery lands
    pub bridge_delivery_topic: String,

    /// Event topic emitted by the DEX factory on pool creation
    pub pool_created_topic: String,

    /// Minimum signer balance to keep operating
    #[serde(with = "rust_decimal::serde::str")]
    pub min_balance: Decimal,

    /// Whether this chain is enabled
    pub enabled: bool,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of retries for failed operations
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> Result<Self, ServiceError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Io(format!("Failed to read config file {}: {}", path, e))
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            ServiceError::Serialization(format!("Failed to parse config file {}: {}", path, e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> Result<(), ServiceError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            ServiceError::Io(format!("Failed to write config file {}: {}", path, e))
        })?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.chains.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "at least one chain must be configured".to_string(),
            ));
        }

        if self.sync_interval_secs == 0 {
            return Err(ServiceError::InvalidConfig(
                "sync_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.deviation_interval_secs == 0 {
            return Err(ServiceError::InvalidConfig(
                "deviation_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_deviation_percent <= Decimal::ZERO {
            return Err(ServiceError::InvalidConfig(
                "max_deviation_percent must be positive".to_string(),
            ));
        }

        for chain in &self.chains {
            chain.validate()?;
        }

        self.retry.validate()?;

        Ok(())
    }

    /// Get enabled chains
    pub fn enabled_chains(&self) -> Vec<&ChainSettings> {
        self.chains.iter().filter(|c| c.enabled).collect()
    }

    /// Look up one chain's settings by id
    pub fn chain(&self, chain_id: &str) -> Option<&ChainSettings> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

impl ChainSettings {
    /// Validate chain configuration
    fn validate(&self) -> Result<(), ServiceError> {
        if self.chain_id.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "chain_id must not be empty".to_string(),
            ));
        }

        if self.rpc_url.is_empty() {
            return Err(ServiceError::InvalidConfig(format!(
                "rpc_url for chain '{}' must not be empty",
                self.chain_id
            )));
        }

        if self.min_balance < Decimal::ZERO {
            return Err(ServiceError::InvalidConfig(format!(
                "min_balance for chain '{}' must be non-negative",
                self.chain_id
            )));
        }

        Ok(())
    }

    /// Whether this chain can submit signed transactions at all
    pub fn can_submit(&self) -> bool {
        self.signer_address.is_some()
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> Result<(), ServiceError> {
        if self.max_retries == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.base_delay_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ServiceError::InvalidConfig(format!(
                "max_delay_ms must be at least base_delay_ms ({})",
                self.base_delay_ms
            )));
        }

        if self.backoff_multiplier <= 1.0 {
            return Err(ServiceError::InvalidConfig(
                "backoff_multiplier must be greater than 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            deviation_interval_secs: DEFAULT_DEVIATION_INTERVAL_SECS,
            max_deviation_percent: max_price_deviation_percent(),
            retry: RetryConfig::default(),
            chains: vec![],
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_id: "local".to_string(),
            name: "Local Devnet".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            signer_address: None,
            dex_factory_address: None,
            bridge_request_topic: "0x4c69717569646974795265717565737465640000000000000000000000000000"
                .to_string(),
            bridge_delivery_topic: "0x4c697175696469747944656c6976657265640000000000000000000000000000"
                .to_string(),
            pool_created_topic: "0x506f6f6c43726561746564000000000000000000000000000000000000000000"
                .to_string(),
            min_balance: Decimal::ZERO,
            enabled: true,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> Result<(), ServiceError> {
    let example_config = EngineConfig {
        sync_interval_secs: 30,
        deviation_interval_secs: 300,
        max_deviation_percent: max_price_deviation_percent(),
        retry: RetryConfig::default(),
        chains: vec![
            ChainSettings {
                chain_id: "ethereum".to_string(),
                name: "Ethereum Mainnet".to_string(),
                rpc_url: "https://eth.llamarpc.com".to_string(),
                signer_address: Some("0x0000000000000000000000000000000000000001".to_string()),
                dex_factory_address: Some("0x0000000000000000000000000000000000000002".to_string()),
                min_balance: Decimal::from(1),
                enabled: true,
                ..ChainSettings::default()
            },
            ChainSettings {
                chain_id: "bsc".to_string(),
                name: "BNB Smart Chain".to_string(),
                rpc_url: "https://bsc-dataseed.binance.org".to_string(),
                signer_address: Some("0x0000000000000000000000000000000000000001".to_string()),
                dex_factory_address: Some("0x0000000000000000000000000000000000000003".to_string()),
                min_balance: Decimal::from(1),
                enabled: true,
                ..ChainSettings::default()
            },
        ],
    };

    example_config.save(path)?;
    Ok(())
}
