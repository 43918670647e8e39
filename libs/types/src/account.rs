//! Free/reserved asset balances
//!
//! Admission moves value from `free` to `reserved`; fills consume from
//! `reserved`; cancels hand the remainder back. Reservation shortfalls are
//! client errors, but overdrawing `reserved` is an engine fault: the
//! caller halts the symbol rather than clamping.

use crate::errors::{EngineFault, RejectReason};
use crate::ids::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balance of one asset for one owner.
///
/// Invariant: `free >= 0` and `reserved >= 0` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub reserved: Decimal,
}

impl AssetBalance {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            free: Decimal::ZERO,
            reserved: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.reserved
    }

    pub fn credit(&mut self, amount: Decimal) {
        debug_assert!(amount >= Decimal::ZERO);
        self.free += amount;
    }

    /// Move `amount` from free to reserved.
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), RejectReason> {
        if amount > self.free {
            return Err(RejectReason::InsufficientBalance {
                asset: self.asset.clone(),
                required: amount,
                available: self.free,
            });
        }
        self.free -= amount;
        self.reserved += amount;
        Ok(())
    }

    /// Return `amount` from reserved to free (cancel, expiry, price
    /// improvement refund).
    pub fn release(&mut self, owner: AccountId, amount: Decimal) -> Result<(), EngineFault> {
        if amount > self.reserved {
            return Err(EngineFault::NegativeBalance {
                owner: owner.to_string(),
                asset: self.asset.clone(),
            });
        }
        self.reserved -= amount;
        self.free += amount;
        Ok(())
    }

    /// Consume `amount` out of reserved (settled to a counterparty).
    pub fn spend_reserved(&mut self, owner: AccountId, amount: Decimal) -> Result<(), EngineFault> {
        if amount > self.reserved {
            return Err(EngineFault::NegativeBalance {
                owner: owner.to_string(),
                asset: self.asset.clone(),
            });
        }
        self.reserved -= amount;
        Ok(())
    }

    /// Debit free balance directly (funding payments, liquidation fees).
    pub fn debit(&mut self, owner: AccountId, amount: Decimal) -> Result<(), EngineFault> {
        if amount > self.free {
            return Err(EngineFault::NegativeBalance {
                owner: owner.to_string(),
                asset: self.asset.clone(),
            });
        }
        self.free -= amount;
        Ok(())
    }
}

/// All balances of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub owner: AccountId,
    pub assets: HashMap<String, AssetBalance>,
}

impl AccountBalances {
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            assets: HashMap::new(),
        }
    }

    pub fn asset(&self, asset: &str) -> Option<&AssetBalance> {
        self.assets.get(asset)
    }

    pub fn asset_mut(&mut self, asset: &str) -> &mut AssetBalance {
        self.assets
            .entry(asset.to_string())
            .or_insert_with(|| AssetBalance::new(asset))
    }

    pub fn free(&self, asset: &str) -> Decimal {
        self.assets
            .get(asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn reserved(&self, asset: &str) -> Decimal {
        self.assets
            .get(asset)
            .map(|b| b.reserved)
            .unwrap_or(Decimal::ZERO)
    }
}
