//! Good-till-date expiry queue
//!
//! Ordered by (expiry instant, order id). Due entries are drained at the
//! start of every symbol critical section, so an order expiring at T is
//! gone before any admission ordered after T.

use std::collections::BTreeSet;
use types::ids::OrderId;

#[derive(Debug, Clone, Default)]
pub struct ExpiryQueue {
    entries: BTreeSet<(i64, OrderId)>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expires_at: i64, order_id: OrderId) {
        self.entries.insert((expires_at, order_id));
    }

    pub fn remove(&mut self, expires_at: i64, order_id: &OrderId) {
        self.entries.remove(&(expires_at, *order_id));
    }

    /// Pop every entry with `expires_at <= now`, earliest first.
    pub fn due(&mut self, now: i64) -> Vec<OrderId> {
        let mut due = Vec::new();
        while let Some(&(at, id)) = self.entries.iter().next() {
            if at > now {
                break;
            }
            self.entries.remove(&(at, id));
            due.push(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_pops_in_time_order() {
        let mut queue = ExpiryQueue::new();
        let a = OrderId::new();
        let b = OrderId::new();
        let c = OrderId::new();
        queue.insert(300, c);
        queue.insert(100, a);
        queue.insert(200, b);

        assert_eq!(queue.due(99), Vec::<OrderId>::new());
        assert_eq!(queue.due(250), vec![a, b]);
        assert_eq!(queue.len(), 1);
        // Boundary instant counts as due.
        assert_eq!(queue.due(300), vec![c]);
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_cancelled_order() {
        let mut queue = ExpiryQueue::new();
        let a = OrderId::new();
        queue.insert(100, a);
        queue.remove(100, &a);
        assert!(queue.due(1000).is_empty());
    }
}
