//! Sharded perpetual position book
//!
//! One shard per owner. A fill touches exactly one shard; the monitor walks
//! shards one at a time, never holding two locks at once.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use types::ids::{AccountId, MarketId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::position::{Direction, MarginMode, Position};

/// Per-owner position shards.
#[derive(Debug, Default)]
pub struct PositionBook {
    shards: DashMap<AccountId, Arc<Mutex<HashMap<MarketId, Position>>>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, owner: AccountId) -> Arc<Mutex<HashMap<MarketId, Position>>> {
        self.shards
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }

    /// Apply a fill to the owner's position in `symbol`.
    /// Returns the post-fill snapshot and the realized P&L delta.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_fill(
        &self,
        owner: AccountId,
        symbol: &MarketId,
        side: Side,
        quantity: Quantity,
        price: Price,
        leverage: u8,
        margin_mode: MarginMode,
        timestamp: i64,
    ) -> (Position, Decimal) {
        let shard = self.shard(owner);
        let mut positions = shard.lock().expect("position shard poisoned");
        let position = positions.entry(symbol.clone()).or_insert_with(|| {
            Position::flat(owner, symbol.clone(), margin_mode, leverage, timestamp)
        });
        position.leverage = leverage.max(1);
        position.margin_mode = margin_mode;
        let realized = position.apply_fill(side, quantity, price, timestamp);
        (position.clone(), realized)
    }

    pub fn get(&self, owner: AccountId, symbol: &MarketId) -> Option<Position> {
        let shard = self.shards.get(&owner)?.clone();
        let positions = shard.lock().expect("position shard poisoned");
        positions.get(symbol).cloned()
    }

    /// Open (non-flat) positions of one owner.
    pub fn positions(&self, owner: AccountId) -> Vec<Position> {
        let Some(shard) = self.shards.get(&owner).map(|s| s.clone()) else {
            return Vec::new();
        };
        let positions = shard.lock().expect("position shard poisoned");
        positions.values().filter(|p| !p.is_flat()).cloned().collect()
    }

    /// Current exposure in `symbol`, if any.
    pub fn open_size(&self, owner: AccountId, symbol: &MarketId) -> Option<(Direction, Quantity)> {
        let position = self.get(owner, symbol)?;
        (!position.is_flat()).then_some((position.direction, position.size))
    }

    /// Whether a fill on `side` would grow the owner's absolute exposure.
    pub fn would_increase(&self, owner: AccountId, symbol: &MarketId, side: Side) -> bool {
        match self.get(owner, symbol) {
            Some(position) => position.fill_increases(side),
            None => true,
        }
    }

    /// Unrealized P&L of the owner's positions outside `except`, from the
    /// last stored marks. Cross-margin liquidation pricing uses this.
    pub fn cross_upl_excluding(&self, owner: AccountId, except: &MarketId) -> Decimal {
        let Some(shard) = self.shards.get(&owner).map(|s| s.clone()) else {
            return Decimal::ZERO;
        };
        let positions = shard.lock().expect("position shard poisoned");
        positions
            .values()
            .filter(|p| !p.is_flat() && &p.symbol != except)
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    /// Unrealized P&L across all of the owner's open positions.
    pub fn total_upl(&self, owner: AccountId) -> Decimal {
        let Some(shard) = self.shards.get(&owner).map(|s| s.clone()) else {
            return Decimal::ZERO;
        };
        let positions = shard.lock().expect("position shard poisoned");
        positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    /// Sum of initial margin across the owner's open positions.
    pub fn position_margin(&self, owner: AccountId) -> Decimal {
        let Some(shard) = self.shards.get(&owner).map(|s| s.clone()) else {
            return Decimal::ZERO;
        };
        let positions = shard.lock().expect("position shard poisoned");
        positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| p.used_margin)
            .sum()
    }

    /// Visit every open position on `symbol`, one owner shard at a time.
    pub fn for_each_in_symbol<F>(&self, symbol: &MarketId, mut f: F)
    where
        F: FnMut(&mut Position),
    {
        let shards: Vec<_> = self.shards.iter().map(|e| e.value().clone()).collect();
        for shard in shards {
            let mut positions = shard.lock().expect("position shard poisoned");
            if let Some(position) = positions.get_mut(symbol) {
                if !position.is_flat() {
                    f(position);
                }
            }
        }
    }

    pub fn owner_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TS: i64 = 1_718_000_000_000_000_000;

    fn market() -> MarketId {
        MarketId::new("BTC/USDT")
    }

    fn fill(
        book: &PositionBook,
        owner: AccountId,
        side: Side,
        qty: &str,
        price: &str,
    ) -> (Position, Decimal) {
        book.apply_fill(
            owner,
            &market(),
            side,
            qty.parse().unwrap(),
            price.parse().unwrap(),
            10,
            MarginMode::Isolated,
            TS,
        )
    }

    #[test]
    fn fill_opens_and_closes() {
        let book = PositionBook::new();
        let owner = AccountId::new();

        let (pos, realized) = fill(&book, owner, Side::Buy, "1.0", "50000");
        assert_eq!(realized, dec!(0));
        assert_eq!(pos.direction, Direction::Long);

        let (pos, realized) = fill(&book, owner, Side::Sell, "1.0", "51000");
        assert_eq!(realized, dec!(1000));
        assert!(pos.is_flat());
        assert!(book.positions(owner).is_empty());
    }

    #[test]
    fn would_increase_tracks_direction() {
        let book = PositionBook::new();
        let owner = AccountId::new();
        assert!(book.would_increase(owner, &market(), Side::Buy));

        fill(&book, owner, Side::Buy, "1.0", "50000");
        assert!(book.would_increase(owner, &market(), Side::Buy));
        assert!(!book.would_increase(owner, &market(), Side::Sell));
    }

    #[test]
    fn open_size_reports_exposure() {
        let book = PositionBook::new();
        let owner = AccountId::new();
        assert_eq!(book.open_size(owner, &market()), None);
        fill(&book, owner, Side::Sell, "0.5", "50000");
        assert_eq!(
            book.open_size(owner, &market()),
            Some((Direction::Short, "0.5".parse().unwrap()))
        );
    }

    #[test]
    fn cross_upl_excludes_the_named_symbol() {
        let book = PositionBook::new();
        let owner = AccountId::new();
        let eth = MarketId::new("ETH/USDT");

        fill(&book, owner, Side::Buy, "1.0", "50000");
        book.apply_fill(
            owner,
            &eth,
            Side::Buy,
            "10".parse().unwrap(),
            "3000".parse().unwrap(),
            10,
            MarginMode::Cross,
            TS,
        );
        // Mark ETH up 100.
        book.for_each_in_symbol(&eth, |p| {
            p.refresh_mark("3100".parse().unwrap(), dec!(0.005), TS + 1)
        });

        assert_eq!(book.cross_upl_excluding(owner, &market()), dec!(1000));
        assert_eq!(book.cross_upl_excluding(owner, &eth), dec!(0));
    }

    #[test]
    fn position_margin_sums_open_positions() {
        let book = PositionBook::new();
        let owner = AccountId::new();
        fill(&book, owner, Side::Buy, "1.0", "50000"); // IM 5000 at 10x
        assert_eq!(book.position_margin(owner), dec!(5000));
    }

    #[test]
    fn for_each_visits_every_owner() {
        let book = PositionBook::new();
        let a = AccountId::new();
        let b = AccountId::new();
        fill(&book, a, Side::Buy, "1.0", "50000");
        fill(&book, b, Side::Sell, "2.0", "50000");

        let mut seen = 0;
        book.for_each_in_symbol(&market(), |_| seen += 1);
        assert_eq!(seen, 2);
        assert_eq!(book.owner_count(), 2);
    }
}
