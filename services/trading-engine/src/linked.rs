//! Bracket and OCO linkage
//!
//! The registry only records relationships; the facade drives the
//! propagation rules (any fill on an OCO leg cancels the sibling, a parent
//! cancel takes both children down, a filling child cancels the other).

use std::collections::HashMap;
use types::ids::OrderId;
use types::order::BracketSpec;

/// Contingent children of a filled bracket parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketChildren {
    pub stop_loss: OrderId,
    pub take_profit: OrderId,
}

impl BracketChildren {
    pub fn sibling_of(&self, child: &OrderId) -> Option<OrderId> {
        if child == &self.stop_loss {
            Some(self.take_profit)
        } else if child == &self.take_profit {
            Some(self.stop_loss)
        } else {
            None
        }
    }
}

/// Order relationships for one symbol.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    /// Bracket parents whose children have not been spawned yet.
    pending_brackets: HashMap<OrderId, BracketSpec>,
    /// Bracket parents with live children.
    brackets: HashMap<OrderId, BracketChildren>,
    /// Child → parent back-references.
    parents: HashMap<OrderId, OrderId>,
    /// OCO sibling pairs, stored in both directions.
    oco: HashMap<OrderId, OrderId>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── OCO ──────────────────────────────────────────────────────────────

    pub fn register_oco(&mut self, a: OrderId, b: OrderId) {
        self.oco.insert(a, b);
        self.oco.insert(b, a);
    }

    pub fn oco_sibling(&self, id: &OrderId) -> Option<OrderId> {
        self.oco.get(id).copied()
    }

    /// Drop the pair; returns the sibling if one was linked.
    pub fn unlink_oco(&mut self, id: &OrderId) -> Option<OrderId> {
        let sibling = self.oco.remove(id)?;
        self.oco.remove(&sibling);
        Some(sibling)
    }

    // ── Brackets ─────────────────────────────────────────────────────────

    pub fn register_pending_bracket(&mut self, parent: OrderId, spec: BracketSpec) {
        self.pending_brackets.insert(parent, spec);
    }

    /// Consume the pending spec when the parent first fills.
    pub fn take_pending_bracket(&mut self, parent: &OrderId) -> Option<BracketSpec> {
        self.pending_brackets.remove(parent)
    }

    pub fn has_pending_bracket(&self, parent: &OrderId) -> bool {
        self.pending_brackets.contains_key(parent)
    }

    pub fn register_children(&mut self, parent: OrderId, children: BracketChildren) {
        self.brackets.insert(parent, children);
        self.parents.insert(children.stop_loss, parent);
        self.parents.insert(children.take_profit, parent);
    }

    pub fn children_of(&self, parent: &OrderId) -> Option<BracketChildren> {
        self.brackets.get(parent).copied()
    }

    pub fn parent_of(&self, child: &OrderId) -> Option<OrderId> {
        self.parents.get(child).copied()
    }

    /// Tear down a bracket entirely (parent cancelled or both children
    /// finished). Returns the children if any were live.
    pub fn remove_bracket(&mut self, parent: &OrderId) -> Option<BracketChildren> {
        self.pending_brackets.remove(parent);
        let children = self.brackets.remove(parent)?;
        self.parents.remove(&children.stop_loss);
        self.parents.remove(&children.take_profit);
        Some(children)
    }
}
