//! Full depth snapshots with monotonic sequence numbers

use matching_engine::OrderBook;
use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

/// One aggregated price level as shown to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: Price,
    pub quantity: Quantity,
}

/// Snapshot of the top of the book at a sequence point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub sequence: u64,
    pub timestamp_us: i64,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
}

impl DepthSnapshot {
    /// Capture up to `depth` levels per side, best first.
    pub fn capture(book: &OrderBook, depth: usize, sequence: u64, timestamp_us: i64) -> Self {
        let (bids, asks) = book.depth(depth);
        let view = |levels: Vec<(Price, Quantity)>| {
            levels
                .into_iter()
                .map(|(price, quantity)| LevelView { price, quantity })
                .collect()
        };
        Self {
            symbol: book.symbol().to_string(),
            sequence,
            timestamp_us,
            bids: view(bids),
            asks: view(asks),
        }
    }
}

/// Per-symbol monotonic sequence source shared by snapshots and deltas.
#[derive(Debug, Clone, Default)]
pub struct SequenceGen {
    next: u64,
}

impl SequenceGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let n = self.next;
        self.next += 1;
        n
    }

    pub fn current(&self) -> u64 {
        self.next
    }
}
