//! Trading engine facade
//!
//! The synchronous entry surface of the exchange (submit, cancel, amend,
//! snapshots, accounts, positions) plus everything the order lifecycle
//! needs around the matching core: the account ledger, stop/trailing
//! triggers, iceberg slicing, bracket/OCO linkage, GTD expiry, admission
//! back-pressure, and the background task runtime.

pub mod engine;
pub mod expiry;
pub mod ledger;
pub mod linked;
pub mod protocol;
pub mod stats;
pub mod tasks;
pub mod triggers;

pub use engine::{unix_now_ns, EngineConfig, Exchange, MarketStats};
pub use ledger::Ledger;
pub use tasks::{spawn_all, BackgroundTasks};
