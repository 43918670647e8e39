//! Maker/taker fee schedules
//!
//! Fees are flat per-symbol rates. The fee debits the asset the party
//! receives: base for the buyer, quote for the seller.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Classification of a fee line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeKind {
    MakerFee,
    TakerFee,
    LiquidationFee,
    FundingFee,
}

/// Per-symbol maker/taker rates. Maker rates may be negative (rebate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }

    /// Zero-fee schedule, used by tests and index symbols.
    pub fn free() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    pub fn maker_fee(&self, received: Decimal) -> Decimal {
        received * self.maker_rate
    }

    pub fn taker_fee(&self, received: Decimal) -> Decimal {
        received * self.taker_rate
    }
}

impl Default for FeeSchedule {
    /// 0.02% maker / 0.05% taker.
    fn default() -> Self {
        Self::new(dec!(0.0002), dec!(0.0005))
    }
}
