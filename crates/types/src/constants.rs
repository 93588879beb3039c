/// Platform constants used across the Omnilaunch ecosystem

use rust_decimal::Decimal;

// ============================================================================
// Reserve Allocation Constants
// ============================================================================

/// Fraction of the ideal reserve a chain must hold before it is flagged low
pub fn min_reserve_ratio() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

/// Fraction of the minimum reserve below which a chain is critical
pub fn critical_reserve_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

/// Multiple of the ideal reserve above which a chain counts as surplus
pub fn surplus_reserve_factor() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

// ============================================================================
// Price Synchronization Constants
// ============================================================================

/// Coefficient-of-variation ceiling (percent) before chains count as out of sync
pub fn max_price_deviation_percent() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

// ============================================================================
// Scheduling Defaults
// ============================================================================

/// Default reserve/graduation monitoring interval in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Default price-deviation monitoring interval in seconds
pub const DEFAULT_DEVIATION_INTERVAL_SECS: u64 = 300;
