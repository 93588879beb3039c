/// Deployment state and curve parameters shared by the engine components

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

// ============================================================================
// Deployment
// ============================================================================

/// Lifecycle status of a per-chain deployment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Contracts are being deployed; the chain does not trade yet
    Pending,
    /// Contracts are live and the chain participates in synchronization
    Deployed,
}

/// One row per (token, chain): the bonding-curve deployment on that chain
///
/// `local_supply` and `local_reserve` are arbitrary-precision decimals and
/// serialize as strings. `graduated` is terminal: once set it never reverts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    /// Token identifier
    pub token_id: String,

    /// Chain identifier
    pub chain_id: String,

    /// Token contract address on this chain
    pub token_address: String,

    /// Bonding-curve contract address on this chain
    pub curve_address: String,

    /// Bridge contract address, if the chain participates in rebalancing
    pub bridge_address: Option<String>,

    /// Lifecycle status
    pub status: DeploymentStatus,

    /// Cumulative units sold on this chain
    #[serde(with = "rust_decimal::serde::str")]
    pub local_supply: Decimal,

    /// Native-currency collateral held by this chain's curve contract
    #[serde(with = "rust_decimal::serde::str")]
    pub local_reserve: Decimal,

    /// Market-cap estimate from the last price synchronization
    #[serde(with = "rust_decimal::serde::str")]
    pub market_cap: Decimal,

    /// Whether this deployment has graduated to a DEX pool
    pub graduated: bool,

    /// When graduation completed
    pub graduated_at: Option<DateTime<Utc>>,

    /// DEX pool address once graduated
    pub pool_address: Option<String>,

    /// Transaction hash of the pool creation
    pub graduation_tx: Option<String>,

    /// Last write timestamp
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a fresh, not-yet-traded deployment row
    pub fn new(token_id: &str, chain_id: &str, token_address: &str, curve_address: &str) -> Self {
        Self {
            token_id: token_id.to_string(),
            chain_id: chain_id.to_string(),
            token_address: token_address.to_string(),
            curve_address: curve_address.to_string(),
            bridge_address: None,
            status: DeploymentStatus::Deployed,
            local_supply: Decimal::ZERO,
            local_reserve: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            graduated: false,
            graduated_at: None,
            pool_address: None,
            graduation_tx: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether this row participates in reserve monitoring and rebalancing
    pub fn is_active(&self) -> bool {
        self.status == DeploymentStatus::Deployed
    }
}

// ============================================================================
// Curve Parameters
// ============================================================================

/// Chain-independent bonding-curve parameters for one token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurveParams {
    /// Token identifier
    pub token_id: String,

    /// Price at zero supply
    #[serde(with = "rust_decimal::serde::str")]
    pub base_price: Decimal,

    /// Price increase per unit of global supply
    #[serde(with = "rust_decimal::serde::str")]
    pub slope: Decimal,

    /// Aggregate market cap at which a chain graduates; zero disables
    #[serde(with = "rust_decimal::serde::str")]
    pub graduation_threshold: Decimal,
}

impl CurveParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.base_price < Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "base_price",
                &self.base_price.to_string(),
                "non-negative",
            ));
        }
        if self.slope < Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "slope",
                &self.slope.to_string(),
                "non-negative",
            ));
        }
        if self.graduation_threshold < Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "graduation_threshold",
                &self.graduation_threshold.to_string(),
                "non-negative (zero disables graduation)",
            ));
        }
        Ok(())
    }

    /// Whether graduation is enabled for this token
    pub fn graduation_enabled(&self) -> bool {
        self.graduation_threshold > Decimal::ZERO
    }
}

// ============================================================================
// Graduation Views
// ============================================================================

/// Read-only graduation progress for one (token, chain)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraduationStatus {
    pub token_id: String,
    pub chain_id: String,

    /// Whether graduation already happened (terminal)
    pub graduated: bool,

    /// Whether the token has a nonzero threshold at all
    pub eligible: bool,

    #[serde(with = "rust_decimal::serde::str")]
    pub market_cap: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub threshold: Decimal,

    /// min(100, market_cap / threshold * 100); zero when disabled
    #[serde(with = "rust_decimal::serde::str")]
    pub progress_percent: Decimal,

    /// DEX pool address once graduated
    pub pool_address: Option<String>,
}

/// Result of one graduation evaluation for a single chain
#[derive(Debug, Clone, PartialEq)]
pub enum GraduationOutcome {
    /// Token has a zero threshold; graduation is disabled
    NotEligible { chain_id: String },

    /// Market cap has not reached the threshold yet
    BelowThreshold {
        chain_id: String,
        progress_percent: Decimal,
    },

    /// The chain graduated during this evaluation
    Graduated {
        chain_id: String,
        pool_address: String,
        tx_hash: String,
    },

    /// Already graduated on an earlier tick; nothing was done
    AlreadyGraduated { chain_id: String },

    /// Pool creation failed; the transition will be retried
    Failed { chain_id: String, message: String },

    /// Backoff window has not elapsed since the last failed attempt
    Deferred { chain_id: String, retry_at: i64 },

    /// All attempts exhausted; flagged for operator attention
    RetriesExhausted { chain_id: String, attempts: u32 },
}
