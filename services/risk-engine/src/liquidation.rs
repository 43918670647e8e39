//! Liquidation thresholds, prices, and fees
//!
//! The liquidation *trigger* is the monitor's margin-ratio check against the
//! symbol's MMR at the observation instant. The liquidation *price* shown on
//! positions is the closed-form estimate below; the monitor's check wins
//! when the two disagree.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use types::numeric::Price;
use types::position::Direction;

/// Graded account health derived from the margin ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    /// Comfortably above maintenance.
    Healthy,
    /// Within 4× MMR: notify.
    Warning,
    /// Within 2× MMR: reduce recommended.
    Danger,
    /// At or below MMR: forced reduction.
    Liquidation,
}

/// Classify a margin ratio against the symbol's maintenance margin rate.
pub fn health_status(margin_ratio: Decimal, mmr: Decimal) -> HealthLevel {
    if mmr.is_zero() || margin_ratio == Decimal::MAX {
        return HealthLevel::Healthy;
    }
    if margin_ratio <= mmr {
        HealthLevel::Liquidation
    } else if margin_ratio <= mmr * dec!(2) {
        HealthLevel::Danger
    } else if margin_ratio <= mmr * dec!(4) {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    }
}

/// `margin_ratio <= mmr` at the observation instant.
pub fn should_liquidate(margin_ratio: Decimal, mmr: Decimal) -> bool {
    !mmr.is_zero() && margin_ratio != Decimal::MAX && margin_ratio <= mmr
}

/// Closed-form liquidation price estimate.
///
/// Long: `entry − (wallet + cross_upl − used_margin × mmr) / size`
/// Short: `entry + (wallet + cross_upl − used_margin × mmr) / size`
///
/// `cross_upl` is the unrealized P&L of the owner's *other* positions (zero
/// for isolated margin). `None` means the position cannot be liquidated by
/// price alone (the buffer exceeds the entry price on a long).
pub fn liquidation_price(
    direction: Direction,
    entry: Price,
    wallet: Decimal,
    cross_upl: Decimal,
    used_margin: Decimal,
    mmr: Decimal,
    size: Decimal,
) -> Option<Price> {
    if size.is_zero() {
        return None;
    }
    let buffer = (wallet + cross_upl - used_margin * mmr) / size;
    match direction {
        Direction::Long => Price::try_new(entry.as_decimal() - buffer),
        Direction::Short => Price::try_new(entry.as_decimal() + buffer),
        Direction::Flat => None,
    }
}

/// Tiered liquidation fee, worse margin pays more. Capped at 5% of the
/// position value.
pub fn liquidation_fee(position_value: Decimal, margin_ratio: Decimal, mmr: Decimal) -> Decimal {
    let rate = if margin_ratio > mmr / dec!(2) {
        dec!(0.005)
    } else if margin_ratio > Decimal::ZERO {
        dec!(0.01)
    } else {
        dec!(0.02)
    };
    let fee = position_value * rate;
    let cap = position_value * dec!(0.05);
    fee.min(cap)
}
