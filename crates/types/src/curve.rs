/// Bonding-curve pricing math shared by the engine and its callers
///
/// All arithmetic is pure decimal math over the global supply figure, so
/// every chain quoting from the same inputs produces the same price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::deployment::CurveParams;

// ============================================================================
// Pricing
// ============================================================================

/// Spot price for a token at the given global supply
///
/// price = base_price + slope * global_supply
pub fn spot_price(params: &CurveParams, global_supply: Decimal) -> Decimal {
    params.base_price + params.slope * global_supply
}

/// Market-cap contribution of one chain at the shared price
pub fn market_cap(price: Decimal, local_supply: Decimal) -> Decimal {
    price * local_supply
}

/// Graduation progress as a percentage, capped at 100
///
/// Returns zero when the threshold is zero (graduation disabled).
pub fn graduation_progress(market_cap: Decimal, threshold: Decimal) -> Decimal {
    if threshold <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let percent = market_cap / threshold * Decimal::ONE_HUNDRED;
    percent.min(Decimal::ONE_HUNDRED)
}

// ============================================================================
// Synchronization Views
// ============================================================================

/// Result of one price synchronization pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSync {
    pub token_id: String,

    #[serde(with = "rust_decimal::serde::str")]
    pub global_supply: Decimal,

    /// The single price every chain now quotes
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,

    /// How many deployment rows had their market cap republished
    pub chains_updated: usize,
}

/// Read-only cross-chain price dispersion diagnostic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceDeviation {
    pub token_id: String,

    #[serde(with = "rust_decimal::serde::str")]
    pub mean_price: Decimal,

    /// Coefficient of variation across sampled chains, in percent
    #[serde(with = "rust_decimal::serde::str")]
    pub coefficient_of_variation: Decimal,

    /// Whether the dispersion exceeds the configured ceiling
    pub out_of_sync: bool,

    pub sampled_chains: usize,
}
