//! Per-symbol order book
//!
//! Two price ladders plus an order-id index for O(log n) cancel, the
//! last-trade price, and volume counters.

pub mod ladder;
pub mod price_level;

pub use ladder::{AskLadder, BidLadder};
pub use price_level::{PriceLevel, RestingEntry};

use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use types::ids::{AccountId, MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;

const DAY_NANOS: i64 = 24 * 3600 * 1_000_000_000;

/// Resting state for one symbol.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    symbol: String,
    bids: BidLadder,
    asks: AskLadder,
    /// Back-reference for indexed cancel.
    index: HashMap<OrderId, (Side, Price)>,
    last_trade: Option<Price>,
    session_volume: Decimal,
    /// (timestamp, quantity) fills inside the rolling 24 h window.
    window: VecDeque<(i64, Decimal)>,
    window_volume: Decimal,
}

impl OrderBook {
    pub fn new(symbol: &MarketId) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Rest an order (or an iceberg slice) on the book.
    ///
    /// The caller has already exhausted crossing opportunities; a resting
    /// order that crosses is a fault the engine checks after every mutation.
    pub fn rest(
        &mut self,
        order_id: OrderId,
        owner: AccountId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) {
        let entry = RestingEntry {
            order_id,
            owner,
            remaining: quantity,
        };
        match side {
            Side::Buy => self.bids.insert(price, entry),
            Side::Sell => self.asks.insert(price, entry),
        }
        self.index.insert(order_id, (side, price));
    }

    /// Indexed unlink. Returns what was resting.
    pub fn cancel(&mut self, order_id: &OrderId) -> Option<(Side, Price, Quantity)> {
        let (side, price) = self.index.remove(order_id)?;
        let removed = match side {
            Side::Buy => self.bids.remove(price, order_id),
            Side::Sell => self.asks.remove(price, order_id),
        };
        debug_assert!(removed.is_some(), "index pointed at a missing entry");
        removed.map(|qty| (side, price, qty))
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.best()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => Some(ask.as_decimal() - bid.as_decimal()),
            _ => None,
        }
    }

    /// Top `n` levels per side, best first.
    pub fn depth(&self, n: usize) -> (Vec<(Price, Quantity)>, Vec<(Price, Quantity)>) {
        (self.bids.depth(n), self.asks.depth(n))
    }

    pub fn bid_levels(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.bids.levels()
    }

    pub fn ask_levels(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.asks.levels()
    }

    /// Liquidity a taker on `side` could reach within its limit.
    pub fn available_to(&self, side: Side, limit: Option<Price>) -> Decimal {
        match side {
            Side::Buy => self.asks.available_at_or_below(limit),
            Side::Sell => self.bids.available_at_or_above(limit),
        }
    }

    /// Quote cost of lifting asks up to `quantity` within `limit`. An upper
    /// bound on what a market buy can spend against the current book, used
    /// to size its reservation.
    pub fn sweep_quote_cost(&self, quantity: Quantity, limit: Option<Price>) -> Decimal {
        let mut left = quantity.as_decimal();
        let mut cost = Decimal::ZERO;
        for (price, available) in self.asks.levels() {
            if left <= Decimal::ZERO || limit.is_some_and(|l| price > l) {
                break;
            }
            let take = available.as_decimal().min(left);
            cost += take * price.as_decimal();
            left -= take;
        }
        cost
    }

    pub fn record_trade(&mut self, price: Price, quantity: Quantity, timestamp: i64) {
        self.last_trade = Some(price);
        let qty = quantity.as_decimal();
        self.session_volume += qty;
        self.window.push_back((timestamp, qty));
        self.window_volume += qty;
        self.prune_window(timestamp);
    }

    fn prune_window(&mut self, now: i64) {
        while let Some(&(ts, qty)) = self.window.front() {
            if now - ts <= DAY_NANOS {
                break;
            }
            self.window.pop_front();
            self.window_volume -= qty;
        }
    }

    pub fn last_trade(&self) -> Option<Price> {
        self.last_trade
    }

    pub fn session_volume(&self) -> Decimal {
        self.session_volume
    }

    pub fn volume_24h(&mut self, now: i64) -> Decimal {
        self.prune_window(now);
        self.window_volume
    }

    /// A book is crossed when the best bid meets or beats the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.index.len()
    }

    /// Best maker opposite an incoming taker: (price, front entry).
    pub(crate) fn peek_opposite(&self, taker_side: Side) -> Option<(Price, RestingEntry)> {
        let (price, level) = match taker_side {
            Side::Buy => self.asks.best_level()?,
            Side::Sell => self.bids.best_level()?,
        };
        level.front().map(|entry| (price, entry.clone()))
    }

    /// Consume `quantity` from the front maker opposite the taker.
    /// Returns true when that maker is done; empty levels are dropped and
    /// finished makers unindexed in the same critical section.
    pub(crate) fn fill_opposite_front(&mut self, taker_side: Side, quantity: Quantity) -> bool {
        match taker_side {
            Side::Buy => {
                let (price, level) = self.asks.best_level_mut().expect("no ask to fill");
                let front_id = level.front().expect("empty ask level").order_id;
                let done = level.fill_front(quantity);
                self.asks.drop_level_if_empty(price);
                if done {
                    self.index.remove(&front_id);
                }
                done
            }
            Side::Sell => {
                let (price, level) = self.bids.best_level_mut().expect("no bid to fill");
                let front_id = level.front().expect("empty bid level").order_id;
                let done = level.fill_front(quantity);
                self.bids.drop_level_if_empty(price);
                if done {
                    self.index.remove(&front_id);
                }
                done
            }
        }
    }

    /// Unlink the front maker opposite the taker (self-trade prevention).
    pub(crate) fn remove_opposite_front(&mut self, taker_side: Side) -> Option<(Price, RestingEntry)> {
        let (price, entry) = self.peek_opposite(taker_side)?;
        match taker_side {
            Side::Buy => self.asks.remove(price, &entry.order_id),
            Side::Sell => self.bids.remove(price, &entry.order_id),
        };
        self.index.remove(&entry.order_id);
        Some((price, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook::new(&MarketId::new("BTC/USDT"))
    }

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    fn qty(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn rest_and_cancel_round_trip() {
        let mut book = book();
        let id = OrderId::new();
        book.rest(id, AccountId::new(), Side::Buy, px("100"), qty("1.0"));
        assert!(book.contains(&id));
        assert_eq!(book.best_bid(), Some((px("100"), qty("1.0"))));

        let (side, price, left) = book.cancel(&id).unwrap();
        assert_eq!((side, price, left), (Side::Buy, px("100"), qty("1.0")));
        assert!(!book.contains(&id));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.cancel(&id), None);
    }

    #[test]
    fn spread_needs_both_sides() {
        let mut book = book();
        book.rest(OrderId::new(), AccountId::new(), Side::Buy, px("99"), qty("1"));
        assert_eq!(book.spread(), None);
        book.rest(OrderId::new(), AccountId::new(), Side::Sell, px("101"), qty("1"));
        assert_eq!(book.spread(), Some(dec!(2)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn depth_snapshot_is_best_first() {
        let mut book = book();
        for (side, p) in [
            (Side::Buy, "98"),
            (Side::Buy, "99"),
            (Side::Sell, "101"),
            (Side::Sell, "102"),
            (Side::Sell, "103"),
        ] {
            book.rest(OrderId::new(), AccountId::new(), side, px(p), qty("1"));
        }
        let (bids, asks) = book.depth(2);
        assert_eq!(bids[0].0, px("99"));
        assert_eq!(asks[0].0, px("101"));
        assert_eq!(asks.len(), 2);
    }

    #[test]
    fn volume_window_prunes() {
        let mut book = book();
        book.record_trade(px("100"), qty("1"), 0);
        book.record_trade(px("100"), qty("2"), DAY_NANOS / 2);
        assert_eq!(book.volume_24h(DAY_NANOS / 2), dec!(3));
        // First fill ages out of the window; session volume keeps counting.
        assert_eq!(book.volume_24h(DAY_NANOS + 1), dec!(2));
        assert_eq!(book.session_volume(), dec!(3));
        assert_eq!(book.last_trade(), Some(px("100")));
    }

    #[test]
    fn crossed_detection() {
        let mut book = book();
        book.rest(OrderId::new(), AccountId::new(), Side::Buy, px("101"), qty("1"));
        book.rest(OrderId::new(), AccountId::new(), Side::Sell, px("100"), qty("1"));
        assert!(book.is_crossed());
    }
}
