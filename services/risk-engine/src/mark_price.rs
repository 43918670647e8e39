//! Mark-price recipe
//!
//! `mark = index × (1 + rate × time_to_next_funding / funding_interval)`
//!
//! The mark converges on the index as settlement approaches, because the
//! funding premium left to collect shrinks.

use rust_decimal::Decimal;
use types::numeric::Price;

use crate::funding::FundingState;

/// Compute the mark from a fresh index and the current funding state.
pub fn mark_price(index: Price, funding: &FundingState, now: i64) -> Price {
    let fraction = funding.time_to_next_fraction(now);
    let mark = index.as_decimal() * (Decimal::ONE + funding.rate * fraction);
    // A funding rate cannot push a positive index to zero, but guard the
    // conversion anyway.
    Price::try_new(mark).unwrap_or(index)
}
