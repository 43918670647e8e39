//! Per-symbol static parameters
//!
//! A [`SymbolSpec`] is immutable after listing. Matching, validation, margin
//! math, and the funding loop all read from it; nothing writes to it.

use crate::errors::RejectReason;
use crate::fee::FeeSchedule;
use crate::ids::MarketId;
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// What kind of instrument trades on this symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    /// Cash market settled against the ledger.
    Spot,
    /// Linear perpetual future settled against the position book.
    LinearPerpetual {
        max_leverage: u8,
        initial_margin_rate: Decimal,
        maintenance_margin_rate: Decimal,
        funding_interval_secs: u64,
    },
}

/// Deterministic resolution when a taker would cross its own resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelfTradePolicy {
    CancelTaker,
    CancelMaker,
    CancelBoth,
}

/// Immutable listing parameters for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub market: MarketId,
    pub tick: Decimal,
    pub lot: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub fees: FeeSchedule,
    pub contract: ContractType,
    /// Maximum deviation ratio from the reference price for market-order
    /// fills. `None` disables the band.
    pub price_band: Option<Decimal>,
    pub self_trade_policy: SelfTradePolicy,
    /// Index updates older than this freeze mark-price and liquidations.
    pub oracle_freshness_secs: u64,
}

impl SymbolSpec {
    /// Spot listing with default fees and no price band.
    pub fn spot(market: MarketId, tick: Decimal, lot: Decimal) -> Self {
        Self {
            market,
            tick,
            lot,
            min_quantity: lot,
            max_quantity: dec!(1_000_000),
            fees: FeeSchedule::default(),
            contract: ContractType::Spot,
            price_band: None,
            self_trade_policy: SelfTradePolicy::CancelTaker,
            oracle_freshness_secs: 10,
        }
    }

    /// Linear perpetual listing. Defaults: 8 h funding, 5% price band.
    pub fn perpetual(
        market: MarketId,
        tick: Decimal,
        lot: Decimal,
        max_leverage: u8,
        initial_margin_rate: Decimal,
        maintenance_margin_rate: Decimal,
    ) -> Self {
        Self {
            market,
            tick,
            lot,
            min_quantity: lot,
            max_quantity: dec!(1_000_000),
            fees: FeeSchedule::default(),
            contract: ContractType::LinearPerpetual {
                max_leverage,
                initial_margin_rate,
                maintenance_margin_rate,
                funding_interval_secs: 8 * 3600,
            },
            price_band: Some(dec!(0.05)),
            self_trade_policy: SelfTradePolicy::CancelTaker,
            oracle_freshness_secs: 10,
        }
    }

    pub fn is_perpetual(&self) -> bool {
        matches!(self.contract, ContractType::LinearPerpetual { .. })
    }

    pub fn max_leverage(&self) -> u8 {
        match self.contract {
            ContractType::Spot => 1,
            ContractType::LinearPerpetual { max_leverage, .. } => max_leverage,
        }
    }

    pub fn maintenance_margin_rate(&self) -> Decimal {
        match self.contract {
            ContractType::Spot => Decimal::ZERO,
            ContractType::LinearPerpetual {
                maintenance_margin_rate,
                ..
            } => maintenance_margin_rate,
        }
    }

    pub fn funding_interval_secs(&self) -> u64 {
        match self.contract {
            ContractType::Spot => 0,
            ContractType::LinearPerpetual {
                funding_interval_secs,
                ..
            } => funding_interval_secs,
        }
    }

    /// Validate a raw client price against positivity and the tick grid.
    pub fn validate_price(&self, value: Decimal) -> Result<Price, RejectReason> {
        let price = Price::try_new(value).ok_or_else(|| RejectReason::InvalidOrder {
            detail: "price must be positive".into(),
        })?;
        if !price.is_aligned(self.tick) {
            return Err(RejectReason::PriceOffTick {
                tick: self.tick,
                requested: value,
            });
        }
        Ok(price)
    }

    /// Validate a raw client quantity against range and the lot grid.
    pub fn validate_quantity(&self, value: Decimal) -> Result<Quantity, RejectReason> {
        if value < self.min_quantity || value > self.max_quantity {
            return Err(RejectReason::QuantityOutOfRange {
                min: self.min_quantity,
                max: self.max_quantity,
                requested: value,
            });
        }
        let quantity = Quantity::try_new(value).ok_or(RejectReason::QuantityOutOfRange {
            min: self.min_quantity,
            max: self.max_quantity,
            requested: value,
        })?;
        if !quantity.is_aligned(self.lot) {
            return Err(RejectReason::QuantityOffLot {
                lot: self.lot,
                requested: value,
            });
        }
        Ok(quantity)
    }
}
