//! Incremental book deltas
//!
//! A delta carries the new aggregate at a price level. Subscribers apply
//! them in sequence order on top of a snapshot. Output ordering is
//! deterministic: bids before asks, then price ascending.

use matching_engine::OrderBook;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::numeric::Price;
use types::order::Side;

/// A single change to one price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDelta {
    pub side: Side,
    pub price: Price,
    pub old_quantity: Decimal,
    /// Zero means the level is gone.
    pub new_quantity: Decimal,
    pub sequence: u64,
    pub timestamp_us: i64,
}

impl BookDelta {
    pub fn is_removal(&self) -> bool {
        self.new_quantity.is_zero() && !self.old_quantity.is_zero()
    }

    pub fn is_new_level(&self) -> bool {
        self.old_quantity.is_zero() && !self.new_quantity.is_zero()
    }
}

/// Aggregates keyed by (side, price); side 0 = bid, 1 = ask, so bids sort
/// before asks without a custom comparator.
pub type LevelMap = BTreeMap<(u8, Price), Decimal>;

/// Snapshot the per-level aggregates of a book for later diffing.
pub fn capture_levels(book: &OrderBook) -> LevelMap {
    let mut map = LevelMap::new();
    for (price, quantity) in book.bid_levels() {
        map.insert((0, price), quantity.as_decimal());
    }
    for (price, quantity) in book.ask_levels() {
        map.insert((1, price), quantity.as_decimal());
    }
    map
}

/// Diff two level captures into deltas. Unchanged levels emit nothing.
pub fn diff_levels(
    before: &LevelMap,
    after: &LevelMap,
    sequence: u64,
    timestamp_us: i64,
) -> Vec<BookDelta> {
    let mut deltas = Vec::new();
    let mut keys: Vec<&(u8, Price)> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let old_quantity = before.get(key).copied().unwrap_or(Decimal::ZERO);
        let new_quantity = after.get(key).copied().unwrap_or(Decimal::ZERO);
        if old_quantity == new_quantity {
            continue;
        }
        let (side_byte, price) = key;
        deltas.push(BookDelta {
            side: if *side_byte == 0 { Side::Buy } else { Side::Sell },
            price: *price,
            old_quantity,
            new_quantity,
            sequence,
            timestamp_us,
        });
    }
    deltas
}
