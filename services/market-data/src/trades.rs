//! Trade stream records
//!
//! Immutable records in emission order, plus a bounded per-symbol tape for
//! recent-trades queries.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use types::ids::{OrderId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// A trade as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    pub sequence: u64,
    pub symbol: String,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    /// Side of the resting order.
    pub maker_side: Side,
    pub executed_at: i64,
}

impl From<&Trade> for TradeRecord {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            sequence: trade.sequence,
            symbol: trade.symbol.to_string(),
            buy_order_id: trade.buy_order_id(),
            sell_order_id: trade.sell_order_id(),
            price: trade.price,
            quantity: trade.quantity,
            maker_side: trade.maker_side,
            executed_at: trade.executed_at,
        }
    }
}

/// Bounded buffer of the most recent trades for one symbol.
#[derive(Debug, Clone)]
pub struct TradeTape {
    records: VecDeque<TradeRecord>,
    capacity: usize,
}

impl TradeTape {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, trade: &Trade) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(TradeRecord::from(trade));
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<TradeRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::ids::{AccountId, MarketId};

    fn trade(sequence: u64) -> Trade {
        Trade::new(
            sequence,
            MarketId::new("BTC/USDT"),
            OrderId::new(),
            OrderId::new(),
            AccountId::new(),
            AccountId::new(),
            Side::Sell,
            "100".parse().unwrap(),
            "1".parse().unwrap(),
            Decimal::ZERO,
            Decimal::ZERO,
            sequence as i64,
        )
    }

    #[test]
    fn record_derives_buy_and_sell_ids() {
        let t = trade(1);
        let record = TradeRecord::from(&t);
        assert_eq!(record.sell_order_id, t.maker_order_id);
        assert_eq!(record.buy_order_id, t.taker_order_id);
    }

    #[test]
    fn tape_is_bounded_and_recent_first() {
        let mut tape = TradeTape::new(2);
        for seq in 0..3 {
            tape.push(&trade(seq));
        }
        assert_eq!(tape.len(), 2);
        let recent = tape.recent(10);
        assert_eq!(recent[0].sequence, 2);
        assert_eq!(recent[1].sequence, 1);
    }
}
