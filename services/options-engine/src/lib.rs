//! Options pricing engine
//!
//! Closed-form Black–Scholes valuation and Greeks for European contracts,
//! plus the listed chain with periodic revaluation from the underlying
//! mark. Options are priced here, never crossed.

pub mod black_scholes;
pub mod chain;

pub use black_scholes::{greeks, price};
pub use chain::OptionChain;
