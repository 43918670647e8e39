//! Market-data egress types
//!
//! Two streams per symbol: book updates (full depth snapshots with a
//! monotonic sequence, or incremental level deltas) and the trade stream.
//! The engine writes into these types; publication to consumers lives
//! outside this crate and can never block matching.

pub mod delta;
pub mod snapshot;
pub mod trades;

pub use delta::{capture_levels, diff_levels, BookDelta, LevelMap};
pub use snapshot::{DepthSnapshot, LevelView, SequenceGen};
pub use trades::{TradeRecord, TradeTape};
