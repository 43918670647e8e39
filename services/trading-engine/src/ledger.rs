//! Sharded account ledger
//!
//! One shard per owner; a fill touches at most the two owners involved.
//! When both sides must move together the shards are locked in owner-id
//! order, so no pair of fills can deadlock.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use types::account::AccountBalances;
use types::errors::{EngineFault, RejectReason};
use types::ids::AccountId;

/// Free/reserved balances for every owner, plus collected fees per asset.
#[derive(Debug, Default)]
pub struct Ledger {
    shards: DashMap<AccountId, Arc<Mutex<AccountBalances>>>,
    fees_collected: DashMap<String, Decimal>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, owner: AccountId) -> Arc<Mutex<AccountBalances>> {
        self.shards
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(AccountBalances::new(owner))))
            .clone()
    }

    pub fn deposit(&self, owner: AccountId, asset: &str, amount: Decimal) {
        let shard = self.shard(owner);
        let mut balances = shard.lock().expect("ledger shard poisoned");
        balances.asset_mut(asset).credit(amount);
    }

    /// Snapshot of one owner's balances.
    pub fn balances(&self, owner: AccountId) -> AccountBalances {
        match self.shards.get(&owner) {
            Some(shard) => shard.lock().expect("ledger shard poisoned").clone(),
            None => AccountBalances::new(owner),
        }
    }

    pub fn free(&self, owner: AccountId, asset: &str) -> Decimal {
        self.balances(owner).free(asset)
    }

    /// Wallet balance: free + reserved. Perpetual margin reads this.
    pub fn wallet(&self, owner: AccountId, asset: &str) -> Decimal {
        let balances = self.balances(owner);
        balances.free(asset) + balances.reserved(asset)
    }

    pub fn reserve(&self, owner: AccountId, asset: &str, amount: Decimal) -> Result<(), RejectReason> {
        if amount.is_zero() {
            return Ok(());
        }
        let shard = self.shard(owner);
        let mut balances = shard.lock().expect("ledger shard poisoned");
        balances.asset_mut(asset).reserve(amount)
    }

    pub fn release(&self, owner: AccountId, asset: &str, amount: Decimal) -> Result<(), EngineFault> {
        if amount.is_zero() {
            return Ok(());
        }
        let shard = self.shard(owner);
        let mut balances = shard.lock().expect("ledger shard poisoned");
        balances.asset_mut(asset).release(owner, amount)
    }

    pub fn credit(&self, owner: AccountId, asset: &str, amount: Decimal) {
        self.deposit(owner, asset, amount)
    }

    /// Debit free balance; fails rather than going negative.
    pub fn debit(&self, owner: AccountId, asset: &str, amount: Decimal) -> Result<(), EngineFault> {
        if amount.is_zero() {
            return Ok(());
        }
        let shard = self.shard(owner);
        let mut balances = shard.lock().expect("ledger shard poisoned");
        balances.asset_mut(asset).debit(owner, amount)
    }

    /// Debit up to `amount` from free balance; returns the shortfall that
    /// could not be covered. Funding and realized losses settle this way.
    pub fn debit_up_to(&self, owner: AccountId, asset: &str, amount: Decimal) -> Decimal {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let shard = self.shard(owner);
        let mut balances = shard.lock().expect("ledger shard poisoned");
        let balance = balances.asset_mut(asset);
        let covered = amount.min(balance.free);
        balance
            .debit(owner, covered)
            .expect("covered amount fits free balance");
        amount - covered
    }

    /// Settle one spot execution. `buyer_spend` is consumed from the
    /// buyer's quote reservation, the seller delivers `quantity` base out
    /// of reserve, and each side is credited net of its fee in the asset
    /// it receives.
    #[allow(clippy::too_many_arguments)]
    pub fn settle_spot(
        &self,
        buyer: AccountId,
        seller: AccountId,
        base: &str,
        quote: &str,
        quantity: Decimal,
        notional: Decimal,
        buyer_fee: Decimal,
        seller_fee: Decimal,
    ) -> Result<(), EngineFault> {
        let buyer_shard = self.shard(buyer);
        let seller_shard = self.shard(seller);

        // Lock in id order; fills never involve the same owner twice.
        debug_assert_ne!(buyer, seller, "self-trade reached settlement");
        let (mut buyer_guard, mut seller_guard) = if buyer <= seller {
            let b = buyer_shard.lock().expect("ledger shard poisoned");
            let s = seller_shard.lock().expect("ledger shard poisoned");
            (b, s)
        } else {
            let s = seller_shard.lock().expect("ledger shard poisoned");
            let b = buyer_shard.lock().expect("ledger shard poisoned");
            (b, s)
        };
        let buyer_bal = &mut *buyer_guard;
        let seller_bal = &mut *seller_guard;

        buyer_bal.asset_mut(quote).spend_reserved(buyer, notional)?;
        seller_bal.asset_mut(base).spend_reserved(seller, quantity)?;
        buyer_bal.asset_mut(base).credit(quantity - buyer_fee);
        seller_bal.asset_mut(quote).credit(notional - seller_fee);

        self.collect_fee(base, buyer_fee);
        self.collect_fee(quote, seller_fee);
        Ok(())
    }

    pub fn collect_fee(&self, asset: &str, amount: Decimal) {
        if !amount.is_zero() {
            *self
                .fees_collected
                .entry(asset.to_string())
                .or_insert(Decimal::ZERO) += amount;
        }
    }

    pub fn fees_collected(&self, asset: &str) -> Decimal {
        self.fees_collected
            .get(asset)
            .map(|f| *f)
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of (free + reserved) across all owners for one asset. The
    /// conservation checks compare this against deposits minus fees.
    pub fn total_in_circulation(&self, asset: &str) -> Decimal {
        let shards: Vec<_> = self.shards.iter().map(|e| e.value().clone()).collect();
        shards
            .into_iter()
            .map(|shard| {
                let balances = shard.lock().expect("ledger shard poisoned");
                balances
                    .asset(asset)
                    .map(|b| b.total())
                    .unwrap_or(Decimal::ZERO)
            })
            .sum()
    }
}
