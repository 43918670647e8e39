//! Matching engine
//!
//! Price–time priority matching over a per-symbol order book.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced
//! - Execution always at the resting maker's price
//! - Deterministic: the same admission stream produces the same trade log
//! - No crossed book at rest
//! - Conservation of quantity

pub mod book;
pub mod engine;
pub mod matching;

pub use book::OrderBook;
pub use engine::{MakerFill, MatchEngine, MatchOutcome, Residual, StpCancel};
