//! Listed option chain
//!
//! Holds every listed contract and refreshes marks and Greeks from the
//! underlying's current mark price. Contracts deactivate at expiry.

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use types::ids::MarketId;
use types::option::OptionContract;

use crate::black_scholes;

/// All listed contracts, keyed by listing code.
#[derive(Debug, Default)]
pub struct OptionChain {
    contracts: DashMap<String, OptionContract>,
    risk_free_rate: f64,
}

impl OptionChain {
    pub fn new(risk_free_rate: f64) -> Self {
        Self {
            contracts: DashMap::new(),
            risk_free_rate,
        }
    }

    pub fn list(&self, contract: OptionContract) {
        self.contracts.insert(contract.code.clone(), contract);
    }

    pub fn get(&self, code: &str) -> Option<OptionContract> {
        self.contracts.get(code).map(|c| c.clone())
    }

    pub fn active(&self) -> Vec<OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Reprice every active contract on `underlying` from its current spot.
    /// Expired contracts deactivate instead of pricing. Returns how many
    /// contracts were repriced.
    pub fn revalue(&self, underlying: &MarketId, spot: f64, now: i64) -> usize {
        let mut repriced = 0;
        for mut contract in self.contracts.iter_mut() {
            if !contract.is_active || &contract.underlying != underlying {
                continue;
            }
            if contract.is_expired(now) {
                contract.deactivate();
                continue;
            }
            let strike = contract.strike.to_f64().unwrap_or(0.0);
            let t = contract.years_to_expiry(now);
            let value = black_scholes::price(
                contract.option_type,
                spot,
                strike,
                t,
                self.risk_free_rate,
                contract.implied_vol,
            );
            contract.greeks = Some(black_scholes::greeks(
                contract.option_type,
                spot,
                strike,
                t,
                self.risk_free_rate,
                contract.implied_vol,
            ));
            contract.mark = Decimal::from_f64_retain(value).map(|m| m.round_dp(8));
            repriced += 1;
        }
        repriced
    }
}
