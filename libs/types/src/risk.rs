//! Liquidation and insurance-fund records

use crate::ids::{AccountId, MarketId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A position queued for forced reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    pub owner: AccountId,
    pub symbol: MarketId,
    /// Side of the synthesised reduce-only order (opposite the position).
    pub close_side: Side,
    pub size: Quantity,
    pub margin_ratio: Decimal,
    /// Retry counter for band-aborted attempts.
    pub attempt: u32,
    pub enqueued_at: i64,
}

/// Completed (or abandoned) liquidation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liquidation {
    pub id: Uuid,
    pub owner: AccountId,
    pub symbol: MarketId,
    pub close_side: Side,
    pub quantity: Quantity,
    pub avg_price: Option<Price>,
    pub margin_ratio: Decimal,
    pub fee: Decimal,
    /// Deficit absorbed by the insurance fund, zero on a clean close.
    pub insurance_loss: Decimal,
    pub timestamp: i64,
}

impl Liquidation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: AccountId,
        symbol: MarketId,
        close_side: Side,
        quantity: Quantity,
        avg_price: Option<Price>,
        margin_ratio: Decimal,
        fee: Decimal,
        insurance_loss: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner,
            symbol,
            close_side,
            quantity,
            avg_price,
            margin_ratio,
            fee,
            insurance_loss,
            timestamp,
        }
    }
}

/// Per-asset insurance fund. Liquidation fees accrue here; deficits from
/// failed liquidations draw it down. The balance may go negative: that is
/// an operator signal, not a clamp site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub asset: String,
    pub balance: Decimal,
    pub total_drawn: Decimal,
    pub total_contributed: Decimal,
}

impl InsuranceFund {
    pub fn new(asset: impl Into<String>, seed: Decimal) -> Self {
        Self {
            asset: asset.into(),
            balance: seed,
            total_drawn: Decimal::ZERO,
            total_contributed: Decimal::ZERO,
        }
    }

    pub fn contribute(&mut self, amount: Decimal) {
        debug_assert!(amount >= Decimal::ZERO);
        self.balance += amount;
        self.total_contributed += amount;
    }

    pub fn draw(&mut self, amount: Decimal) {
        debug_assert!(amount >= Decimal::ZERO);
        self.balance -= amount;
        self.total_drawn += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fund_accrues_and_draws() {
        let mut fund = InsuranceFund::new("USDT", dec!(1000));
        fund.contribute(dec!(50));
        fund.draw(dec!(300));
        assert_eq!(fund.balance, dec!(750));
        assert_eq!(fund.total_drawn, dec!(300));
        assert_eq!(fund.total_contributed, dec!(50));
    }

    #[test]
    fn fund_balance_may_go_negative() {
        let mut fund = InsuranceFund::new("USDT", dec!(100));
        fund.draw(dec!(250));
        assert_eq!(fund.balance, dec!(-150));
    }

    #[test]
    fn liquidation_record_round_trips() {
        let liq = Liquidation::new(
            AccountId::new(),
            MarketId::new("BTC/USDT"),
            Side::Sell,
            "1".parse().unwrap(),
            Some("45000".parse().unwrap()),
            dec!(0.004),
            dec!(225),
            Decimal::ZERO,
            1,
        );
        let json = serde_json::to_string(&liq).unwrap();
        let back: Liquidation = serde_json::from_str(&json).unwrap();
        assert_eq!(liq, back);
    }
}
