//! Index-price oracle ingestion
//!
//! The oracle itself is external; this board stores the latest tick per
//! symbol and answers freshness queries. A stale index freezes mark-price
//! updates and suppresses liquidations: matching continues.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use types::ids::MarketId;
use types::numeric::Price;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Latest index observation for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexTick {
    pub price: Price,
    pub received_at: i64,
}

/// Per-symbol index store.
#[derive(Debug, Default)]
pub struct OracleBoard {
    ticks: DashMap<MarketId, IndexTick>,
}

impl OracleBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, symbol: MarketId, price: Price, received_at: i64) {
        self.ticks.insert(
            symbol,
            IndexTick {
                price,
                received_at,
            },
        );
    }

    pub fn latest(&self, symbol: &MarketId) -> Option<IndexTick> {
        self.ticks.get(symbol).map(|t| *t)
    }

    /// The index price, only if it is inside the freshness window.
    pub fn fresh_index(&self, symbol: &MarketId, now: i64, window_secs: u64) -> Option<Price> {
        let tick = self.latest(symbol)?;
        let age = now - tick.received_at;
        (age >= 0 && age <= window_secs as i64 * NANOS_PER_SEC).then_some(tick.price)
    }

    pub fn is_stale(&self, symbol: &MarketId, now: i64, window_secs: u64) -> bool {
        self.fresh_index(symbol, now, window_secs).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> MarketId {
        MarketId::new("BTC/USDT")
    }

    #[test]
    fn fresh_within_window() {
        let board = OracleBoard::new();
        board.update(market(), "50000".parse().unwrap(), 0);
        assert_eq!(
            board.fresh_index(&market(), 5 * NANOS_PER_SEC, 10),
            Some("50000".parse().unwrap())
        );
    }

    #[test]
    fn stale_outside_window() {
        let board = OracleBoard::new();
        board.update(market(), "50000".parse().unwrap(), 0);
        assert!(board.is_stale(&market(), 11 * NANOS_PER_SEC, 10));
        assert_eq!(board.fresh_index(&market(), 11 * NANOS_PER_SEC, 10), None);
    }

    #[test]
    fn missing_symbol_is_stale() {
        let board = OracleBoard::new();
        assert!(board.is_stale(&market(), 0, 10));
    }

    #[test]
    fn newer_tick_replaces_older() {
        let board = OracleBoard::new();
        board.update(market(), "50000".parse().unwrap(), 0);
        board.update(market(), "50100".parse().unwrap(), NANOS_PER_SEC);
        assert_eq!(
            board.latest(&market()).unwrap().price,
            "50100".parse().unwrap()
        );
    }
}
