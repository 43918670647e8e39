//! Derivatives risk engine
//!
//! Perpetual position accounting, margin methodology, the mark-price and
//! funding loops, the position monitor, and the liquidation queue. All
//! components here are passive: periodic driving and ledger settlement
//! happen in the engine facade, which owns the task runtime.

pub mod engine;
pub mod events;
pub mod funding;
pub mod liquidation;
pub mod liquidator;
pub mod margin;
pub mod mark_price;
pub mod oracle;
pub mod positions;

pub use engine::{RiskConfig, RiskEngine};
pub use liquidator::{liquidation_channel, LiquidationQueue};
pub use positions::PositionBook;
