//! Error taxonomy
//!
//! Three disjoint classes with different handling:
//! - [`RejectReason`]: client-visible admission rejections with stable codes
//! - [`CancelError`]: cancel/amend on an unknown, foreign, or finished order
//! - [`EngineFault`]: invariant violations. Fatal: the affected symbol halts
//!   and rejects further operations until operator intervention.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed admission rejection with a stable wire code.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("quantity {requested} outside [{min}, {max}]")]
    QuantityOutOfRange {
        min: Decimal,
        max: Decimal,
        requested: Decimal,
    },

    #[error("quantity {requested} not a multiple of lot {lot}")]
    QuantityOffLot { lot: Decimal, requested: Decimal },

    #[error("price {requested} not a multiple of tick {tick}")]
    PriceOffTick { tick: Decimal, requested: Decimal },

    #[error("order is malformed: {detail}")]
    InvalidOrder { detail: String },

    #[error("insufficient {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("leverage {requested}x exceeds maximum {max}x")]
    LeverageExceeded { max: u8, requested: u8 },

    #[error("reduce-only order would increase position")]
    ReduceOnlyViolation,

    #[error("no position to close")]
    NoPosition,

    #[error("index price for {symbol} is stale")]
    StaleOracle { symbol: String },

    #[error("price outside protective band")]
    PriceOutsideBand,

    #[error("fill-or-kill cannot be fully filled")]
    UnfillableFok,

    #[error("self-trade prevented")]
    SelfTrade,

    #[error("admission queue over high-water mark")]
    Overloaded,

    #[error("symbol halted pending operator intervention")]
    SymbolHalted,
}

impl RejectReason {
    /// Stable code for the wire. Never renumber or rename these.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::UnknownSymbol { .. } => "UNKNOWN_SYMBOL",
            RejectReason::QuantityOutOfRange { .. } => "QUANTITY_OUT_OF_RANGE",
            RejectReason::QuantityOffLot { .. } => "QUANTITY_OFF_LOT",
            RejectReason::PriceOffTick { .. } => "PRICE_OFF_TICK",
            RejectReason::InvalidOrder { .. } => "INVALID_ORDER",
            RejectReason::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            RejectReason::LeverageExceeded { .. } => "LEVERAGE_EXCEEDED",
            RejectReason::ReduceOnlyViolation => "REDUCE_ONLY_VIOLATION",
            RejectReason::NoPosition => "NO_POSITION",
            RejectReason::StaleOracle { .. } => "STALE_ORACLE",
            RejectReason::PriceOutsideBand => "PRICE_OUTSIDE_BAND",
            RejectReason::UnfillableFok => "UNFILLABLE_FOK",
            RejectReason::SelfTrade => "SELF_TRADE",
            RejectReason::Overloaded => "OVERLOADED",
            RejectReason::SymbolHalted => "SYMBOL_HALTED",
        }
    }
}

/// Outcome of a cancel or amend that found nothing to act on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelError {
    #[error("order not found")]
    NotFound,
    #[error("order belongs to another account")]
    NotOwned,
    #[error("order already in a terminal state")]
    Terminal,
}

/// Invariant violation. These must never be papered over: the engine halts
/// the affected symbol and surfaces the fault to the operator.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineFault {
    #[error("balance for {asset} would go negative (owner {owner})")]
    NegativeBalance { owner: String, asset: String },

    #[error("book for {symbol} is crossed at rest")]
    CrossedBook { symbol: String },

    #[error("child order {child} has no live parent")]
    OrphanChild { child: String },

    #[error("ledger conservation drift on {asset}: {delta}")]
    LedgerDrift { asset: String, delta: Decimal },
}

/// Top-level error for engine entry points.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("cancel failed: {0}")]
    Cancel(#[from] CancelError),

    #[error("fatal: {0}")]
    Fault(#[from] EngineFault),
}
