//! Price ladders: bids descending, asks ascending
//!
//! Both sides store levels in a BTreeMap keyed by price for deterministic
//! iteration; the bid side reads it back-to-front.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::{PriceLevel, RestingEntry};

/// Buy side: best price is the highest.
#[derive(Debug, Clone, Default)]
pub struct BidLadder {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidLadder {
    pub fn insert(&mut self, price: Price, entry: RestingEntry) {
        self.levels.entry(price).or_default().push(entry);
    }

    /// Unlink an order; drops the level if it became empty.
    pub fn remove(&mut self, price: Price, order_id: &OrderId) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    pub fn best(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next_back()
            .map(|(p, level)| (*p, level.aggregate()))
    }

    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    pub(crate) fn best_level(&self) -> Option<(Price, &PriceLevel)> {
        self.levels.iter().next_back().map(|(p, level)| (*p, level))
    }

    pub(crate) fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next_back()
            .map(|(p, level)| (*p, level))
    }

    pub(crate) fn drop_level_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(|l| l.is_empty()) {
            self.levels.remove(&price);
        }
    }

    /// Top `n` levels, best first.
    pub fn depth(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .rev()
            .take(n)
            .map(|(p, level)| (*p, level.aggregate()))
            .collect()
    }

    /// All levels, best first. Used for delta diffing.
    pub fn levels(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.levels
            .iter()
            .rev()
            .map(|(p, level)| (*p, level.aggregate()))
    }

    /// Aggregate quantity resting at prices a seller at `limit` could hit.
    /// `None` means any price is acceptable.
    pub fn available_at_or_above(&self, limit: Option<Price>) -> Decimal {
        self.levels
            .iter()
            .rev()
            .take_while(|(p, _)| limit.is_none_or(|l| **p >= l))
            .map(|(_, level)| level.aggregate().as_decimal())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Sell side: best price is the lowest.
#[derive(Debug, Clone, Default)]
pub struct AskLadder {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskLadder {
    pub fn insert(&mut self, price: Price, entry: RestingEntry) {
        self.levels.entry(price).or_default().push(entry);
    }

    pub fn remove(&mut self, price: Price, order_id: &OrderId) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    pub fn best(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(p, level)| (*p, level.aggregate()))
    }

    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    pub(crate) fn best_level(&self) -> Option<(Price, &PriceLevel)> {
        self.levels.iter().next().map(|(p, level)| (*p, level))
    }

    pub(crate) fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels.iter_mut().next().map(|(p, level)| (*p, level))
    }

    pub(crate) fn drop_level_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(|l| l.is_empty()) {
            self.levels.remove(&price);
        }
    }

    pub fn depth(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(n)
            .map(|(p, level)| (*p, level.aggregate()))
            .collect()
    }

    pub fn levels(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.levels
            .iter()
            .map(|(p, level)| (*p, level.aggregate()))
    }

    /// Aggregate quantity resting at prices a buyer at `limit` could lift.
    pub fn available_at_or_below(&self, limit: Option<Price>) -> Decimal {
        self.levels
            .iter()
            .take_while(|(p, _)| limit.is_none_or(|l| **p <= l))
            .map(|(_, level)| level.aggregate().as_decimal())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
