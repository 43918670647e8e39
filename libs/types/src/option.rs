//! Option contract types
//!
//! Contracts here are priced, never crossed. European exercise is the only
//! style the pricer evaluates; the other styles are listing metadata.

use crate::ids::MarketId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const NANOS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0 * 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    Call,
    Put,
}

/// Exercise style. Only European contracts are priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionStyle {
    European,
    American,
    Asian,
    Barrier,
    Binary,
    Lookback,
    Rainbow,
}

/// Black–Scholes sensitivities.
///
/// Theta is per calendar day, vega per 1% volatility move, rho per 1% rate
/// move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl Greeks {
    pub const ZERO: Greeks = Greeks {
        delta: 0.0,
        gamma: 0.0,
        theta: 0.0,
        vega: 0.0,
        rho: 0.0,
    };
}

/// A listed option contract with its displayed marks and cached Greeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Listing code, e.g. "BTC-251226-60000-C".
    pub code: String,
    pub underlying: MarketId,
    pub option_type: OptionType,
    pub style: OptionStyle,
    pub strike: Decimal,
    /// Expiry instant, Unix nanos.
    pub expiry: i64,
    pub tick: Decimal,
    pub lot: Decimal,
    pub implied_vol: f64,
    pub mark: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub greeks: Option<Greeks>,
    pub is_active: bool,
    pub listed_at: i64,
}

impl OptionContract {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: impl Into<String>,
        underlying: MarketId,
        option_type: OptionType,
        strike: Decimal,
        expiry: i64,
        tick: Decimal,
        lot: Decimal,
        implied_vol: f64,
        listed_at: i64,
    ) -> Self {
        Self {
            code: code.into(),
            underlying,
            option_type,
            style: OptionStyle::European,
            strike,
            expiry,
            tick,
            lot,
            implied_vol,
            mark: None,
            bid: None,
            ask: None,
            last: None,
            greeks: None,
            is_active: true,
            listed_at,
        }
    }

    /// Time to expiry in years at `now` (Unix nanos); never negative.
    pub fn years_to_expiry(&self, now: i64) -> f64 {
        let remaining = (self.expiry - now) as f64;
        (remaining / NANOS_PER_YEAR).max(0.0)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expiry
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
