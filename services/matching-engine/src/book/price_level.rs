//! One price level: a FIFO of resting orders and a cached aggregate
//!
//! Arrival order inside the level is time priority. The aggregate always
//! equals the sum of the entries' remaining quantities.

use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::Quantity;

/// A resting order's footprint in the book.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingEntry {
    pub order_id: OrderId,
    pub owner: AccountId,
    pub remaining: Quantity,
}

/// FIFO queue of resting orders at one price.
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    queue: VecDeque<RestingEntry>,
    aggregate: Quantity,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the back: newest arrival, last priority.
    pub fn push(&mut self, entry: RestingEntry) {
        self.aggregate = self.aggregate + entry.remaining;
        self.queue.push_back(entry);
    }

    /// Unlink an order anywhere in the queue. Returns its remaining quantity.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let at = self.queue.iter().position(|e| &e.order_id == order_id)?;
        let entry = self.queue.remove(at)?;
        self.aggregate = self
            .aggregate
            .checked_sub(entry.remaining)
            .unwrap_or(Quantity::zero());
        Some(entry.remaining)
    }

    pub fn front(&self) -> Option<&RestingEntry> {
        self.queue.front()
    }

    /// Consume `quantity` from the front entry. Returns true when the entry
    /// is fully consumed (and popped).
    ///
    /// # Panics
    /// Panics if `quantity` exceeds the front entry's remaining quantity;
    /// the matcher computes `min` first, so overshoot is a bug.
    pub fn fill_front(&mut self, quantity: Quantity) -> bool {
        let front = self.queue.front_mut().expect("fill_front on empty level");
        let left = front
            .remaining
            .checked_sub(quantity)
            .expect("fill exceeds front entry");
        self.aggregate = self
            .aggregate
            .checked_sub(quantity)
            .unwrap_or(Quantity::zero());
        if left.is_zero() {
            self.queue.pop_front();
            true
        } else {
            front.remaining = left;
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn aggregate(&self) -> Quantity {
        self.aggregate
    }

    pub fn order_count(&self) -> usize {
        self.queue.len()
    }
}
