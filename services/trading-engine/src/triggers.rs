//! Stop and trailing-stop trigger book
//!
//! Shells wait here until their reference price (mark or last, per the
//! order's working-price choice) crosses the stop. Trailing stops ratchet
//! on every reference change and never regress against the trail direction.
//! Iteration is over a BTreeMap so trigger order is deterministic.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::{Side, TrailBy, WorkingPrice};

/// Trigger state for one pending shell.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerState {
    pub order_id: OrderId,
    pub side: Side,
    pub working: WorkingPrice,
    pub stop: Price,
    pub trail: Option<TrailBy>,
}

impl TriggerState {
    /// Buy stops arm when the reference rises to the stop; sell stops when
    /// it falls to the stop. A trailing stop that just ratcheted flush with
    /// the reference must not fire on that same observation, so trailing
    /// triggers are strict.
    fn is_triggered(&self, reference: Price) -> bool {
        match (self.side, self.trail.is_some()) {
            (Side::Buy, false) => reference >= self.stop,
            (Side::Sell, false) => reference <= self.stop,
            (Side::Buy, true) => reference > self.stop,
            (Side::Sell, true) => reference < self.stop,
        }
    }

    /// Ratchet a trailing stop toward the reference; plain stops hold.
    fn ratchet(&mut self, reference: Price) {
        let Some(trail) = self.trail else { return };
        let distance = trail.distance(reference);
        match self.side {
            // A sell trail rises with the market, never falls.
            Side::Sell => {
                if let Some(candidate) = reference.checked_sub(distance) {
                    if candidate > self.stop {
                        self.stop = candidate;
                    }
                }
            }
            // A buy trail falls with the market, never rises.
            Side::Buy => {
                let candidate = reference + distance;
                if candidate < self.stop {
                    self.stop = candidate;
                }
            }
        }
    }
}

/// Pending shells for one symbol.
#[derive(Debug, Clone, Default)]
pub struct TriggerBook {
    shells: BTreeMap<OrderId, TriggerState>,
}

impl TriggerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: TriggerState) {
        self.shells.insert(state.order_id, state);
    }

    pub fn remove(&mut self, order_id: &OrderId) -> Option<TriggerState> {
        self.shells.remove(order_id)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.shells.contains_key(order_id)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&TriggerState> {
        self.shells.get(order_id)
    }

    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Feed a reference-price change from `source`. Trailing stops on that
    /// source ratchet first, then any shell whose stop is crossed is
    /// removed and returned for arming, in id order.
    pub fn on_reference(&mut self, source: WorkingPrice, reference: Price) -> Vec<TriggerState> {
        let mut armed = Vec::new();
        let mut fired = Vec::new();
        for (id, shell) in self.shells.iter_mut() {
            if shell.working != source {
                continue;
            }
            shell.ratchet(reference);
            if shell.is_triggered(reference) {
                fired.push(*id);
            }
        }
        for id in fired {
            if let Some(shell) = self.shells.remove(&id) {
                armed.push(shell);
            }
        }
        armed
    }
}
