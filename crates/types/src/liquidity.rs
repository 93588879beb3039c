/// Reserve snapshots and cross-chain liquidity request types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{critical_reserve_factor, min_reserve_ratio, surplus_reserve_factor};

// ============================================================================
// Reserve Snapshot
// ============================================================================

/// Health classification of a chain's collateral reserve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReserveStatus {
    /// Reserve is at or above the minimum
    Sufficient,
    /// Reserve is below the minimum but above the critical line
    Low,
    /// Reserve is below half the minimum
    Critical,
}

/// Derived per-chain reserve view: actual vs ideal vs minimum
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReserveSnapshot {
    /// Chain identifier
    pub chain_id: String,

    /// Actual collateral held by this chain
    #[serde(with = "rust_decimal::serde::str")]
    pub reserve: Decimal,

    /// Ideal allocation: total reserve weighted by this chain's supply share
    #[serde(with = "rust_decimal::serde::str")]
    pub ideal_reserve: Decimal,

    /// Minimum operating reserve (0.3 x ideal)
    #[serde(with = "rust_decimal::serde::str")]
    pub min_reserve: Decimal,

    /// Health classification
    pub status: ReserveStatus,
}

impl ReserveSnapshot {
    /// Classify a chain's reserve against its ideal allocation
    ///
    /// Critical means below half the minimum reserve; low means below the
    /// minimum; everything else is sufficient.
    pub fn compute(chain_id: &str, reserve: Decimal, ideal_reserve: Decimal) -> Self {
        let min_reserve = ideal_reserve * min_reserve_ratio();
        let critical_line = min_reserve * critical_reserve_factor();

        let status = if reserve < critical_line {
            ReserveStatus::Critical
        } else if reserve < min_reserve {
            ReserveStatus::Low
        } else {
            ReserveStatus::Sufficient
        };

        Self {
            chain_id: chain_id.to_string(),
            reserve,
            ideal_reserve,
            min_reserve,
            status,
        }
    }

    /// Whether this chain needs liquidity moved in
    pub fn is_deficit(&self) -> bool {
        matches!(self.status, ReserveStatus::Low | ReserveStatus::Critical)
    }

    /// Whether this chain holds enough excess to fund a transfer out
    pub fn is_surplus(&self) -> bool {
        self.reserve > self.ideal_reserve * surplus_reserve_factor()
    }

    /// How far below the ideal allocation this chain sits
    pub fn shortfall(&self) -> Decimal {
        (self.ideal_reserve - self.reserve).max(Decimal::ZERO)
    }

    /// How far above the ideal allocation this chain sits
    pub fn excess(&self) -> Decimal {
        (self.reserve - self.ideal_reserve).max(Decimal::ZERO)
    }
}

/// Result of a pre-sell reserve sufficiency check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReserveCheck {
    /// Whether the chain can honor a sell of the required size
    pub sufficient: bool,

    #[serde(with = "rust_decimal::serde::str")]
    pub current_reserve: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub required_amount: Decimal,
}

// ============================================================================
// Liquidity Request
// ============================================================================

/// Lifecycle of a cross-chain liquidity transfer
///
/// Pending and bridging are transient; completed and failed are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityRequestStatus {
    /// Request transaction issued on the target chain
    Pending,
    /// Funding transaction issued on the source chain
    Bridging,
    /// Destination-side delivery confirmed
    Completed,
    /// Given up after exhausting attempts
    Failed,
}

/// One cross-chain transfer, idempotently keyed by its external request id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiquidityRequest {
    /// Externally-issued request id (bridge event id, or the tx hash)
    pub request_id: String,

    /// Token identifier
    pub token_id: String,

    /// Funding chain; unknown until the bridge execution step
    pub source_chain: Option<String>,

    /// Chain receiving the liquidity
    pub target_chain: String,

    /// Collateral amount to move
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// Lifecycle status
    pub status: LiquidityRequestStatus,

    /// Delivery-confirmation attempts so far
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiquidityRequest {
    /// Create a new pending request
    pub fn new(request_id: &str, token_id: &str, target_chain: &str, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.to_string(),
            token_id: token_id.to_string(),
            source_chain: None,
            target_chain: target_chain.to_string(),
            amount,
            status: LiquidityRequestStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the request has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            LiquidityRequestStatus::Completed | LiquidityRequestStatus::Failed
        )
    }
}

// ============================================================================
// Operation Outcomes
// ============================================================================

/// Non-throwing result of a bridge operation
///
/// Chain-client failures surface here instead of as errors; store failures
/// still propagate through the Result channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeOutcome {
    pub success: bool,
    pub message: String,
    pub request_id: Option<String>,
    pub tx_hash: Option<String>,
}

impl BridgeOutcome {
    /// Successful outcome with correlation details
    pub fn ok(message: &str, request_id: Option<String>, tx_hash: Option<String>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            request_id,
            tx_hash,
        }
    }

    /// Failed outcome carrying the caught chain-client error
    pub fn failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            request_id: None,
            tx_hash: None,
        }
    }
}

/// Result of one rebalancing pass over a token
#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceOutcome {
    /// One transfer was triggered (at most one per invocation)
    Rebalanced {
        source_chain: String,
        target_chain: String,
        amount: Decimal,
        request_id: String,
    },

    /// No deficit found, or no surplus chain could cover a shortfall
    NoAction { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(reserve: i64) -> ReserveSnapshot {
        ReserveSnapshot::compute("chain-a", Decimal::from(reserve), Decimal::from(100))
    }

    #[test]
    fn test_reserve_classification_bands() {
        // ideal = 100 -> min = 30, critical line = 15
        assert_eq!(snapshot(14).status, ReserveStatus::Critical);
        assert_eq!(snapshot(29).status, ReserveStatus::Low);
        assert_eq!(snapshot(31).status, ReserveStatus::Sufficient);
        assert_eq!(snapshot(100).status, ReserveStatus::Sufficient);
    }

    #[test]
    fn test_reserve_classification_exact_boundaries() {
        // The bands are strict less-than comparisons
        assert_eq!(snapshot(15).status, ReserveStatus::Low);
        assert_eq!(snapshot(30).status, ReserveStatus::Sufficient);
    }

    #[test]
    fn test_surplus_requires_more_than_150_percent_of_ideal() {
        assert!(!snapshot(150).is_surplus());
        assert!(snapshot(151).is_surplus());
        assert!(!snapshot(100).is_surplus());
    }

    #[test]
    fn test_shortfall_and_excess_never_negative() {
        let deficit = snapshot(40);
        assert_eq!(deficit.shortfall(), Decimal::from(60));
        assert_eq!(deficit.excess(), Decimal::ZERO);

        let surplus = snapshot(180);
        assert_eq!(surplus.shortfall(), Decimal::ZERO);
        assert_eq!(surplus.excess(), Decimal::from(80));
    }

    #[test]
    fn test_zero_ideal_reserve_is_sufficient() {
        let snap = ReserveSnapshot::compute("chain-a", Decimal::ZERO, Decimal::ZERO);
        assert_eq!(snap.status, ReserveStatus::Sufficient);
    }
}
