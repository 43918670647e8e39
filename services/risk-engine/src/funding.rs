//! Funding rate computation and settlement schedule
//!
//! The rate is recomputed every minute from the premium of mark over index;
//! settlement happens at each funding boundary (default 8 h). Longs pay
//! shorts when the rate is positive, and vice versa.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use types::numeric::Price;

/// Default clamp on `interest − premium`: ±0.05%.
pub const DEFAULT_RATE_CAP: Decimal = dec!(0.0005);
/// Default interest rate component: 0.01% per interval.
pub const DEFAULT_INTEREST_RATE: Decimal = dec!(0.0001);

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Per-symbol funding state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingState {
    pub rate: Decimal,
    pub premium: Decimal,
    pub interval_secs: u64,
    /// Next settlement boundary, Unix nanos.
    pub next_funding_at: i64,
    pub updated_at: i64,
}

impl FundingState {
    pub fn new(interval_secs: u64, now: i64) -> Self {
        Self {
            rate: Decimal::ZERO,
            premium: Decimal::ZERO,
            interval_secs,
            next_funding_at: now + interval_secs as i64 * NANOS_PER_SEC,
            updated_at: now,
        }
    }

    /// Recompute the rate from fresh mark/index observations.
    pub fn refresh_rate(
        &mut self,
        mark: Price,
        index: Price,
        interest_rate: Decimal,
        cap: Decimal,
        now: i64,
    ) {
        self.premium = premium_index(mark, index);
        self.rate = funding_rate(self.premium, interest_rate, cap);
        self.updated_at = now;
    }

    /// Fraction of the interval remaining until the next settlement, in
    /// [0, 1]. Used by the mark-price recipe.
    pub fn time_to_next_fraction(&self, now: i64) -> Decimal {
        let interval = self.interval_secs as i64 * NANOS_PER_SEC;
        if interval == 0 {
            return Decimal::ZERO;
        }
        let remaining = (self.next_funding_at - now).clamp(0, interval);
        Decimal::from(remaining) / Decimal::from(interval)
    }

    /// True exactly when a settlement boundary has been crossed; rolls the
    /// schedule forward.
    pub fn settle_due(&mut self, now: i64) -> bool {
        if now < self.next_funding_at {
            return false;
        }
        let interval = self.interval_secs as i64 * NANOS_PER_SEC;
        while self.next_funding_at <= now {
            self.next_funding_at += interval;
        }
        true
    }
}

/// `premium = (mark − index) / index`
pub fn premium_index(mark: Price, index: Price) -> Decimal {
    (mark.as_decimal() - index.as_decimal()) / index.as_decimal()
}

/// `rate = premium + clamp(interest − premium, −cap, +cap)`
pub fn funding_rate(premium: Decimal, interest_rate: Decimal, cap: Decimal) -> Decimal {
    premium + (interest_rate - premium).clamp(-cap, cap)
}

/// Payment owed *by* a position for one settlement: positive means the
/// position pays. `signed_size` is positive long, negative short.
pub fn funding_payment(signed_size: Decimal, mark: Price, rate: Decimal) -> Decimal {
    signed_size * mark.as_decimal() * rate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    #[test]
    fn premium_signs() {
        assert_eq!(premium_index(px("50500"), px("50000")), dec!(0.01));
        assert_eq!(premium_index(px("49500"), px("50000")), dec!(-0.01));
    }

    #[test]
    fn rate_clamps_toward_interest() {
        // Large premium: correction clamps at -cap, rate = premium - cap.
        let rate = funding_rate(dec!(0.01), DEFAULT_INTEREST_RATE, DEFAULT_RATE_CAP);
        assert_eq!(rate, dec!(0.0095));
        // Tiny premium: correction fits inside the cap, rate = interest.
        let rate = funding_rate(dec!(0.00005), DEFAULT_INTEREST_RATE, DEFAULT_RATE_CAP);
        assert_eq!(rate, DEFAULT_INTEREST_RATE);
        // Deep discount clamps the other way.
        let rate = funding_rate(dec!(-0.01), DEFAULT_INTEREST_RATE, DEFAULT_RATE_CAP);
        assert_eq!(rate, dec!(-0.0095));
    }

    #[test]
    fn payment_direction() {
        // Long pays on positive rate.
        assert_eq!(funding_payment(dec!(1), px("50000"), dec!(0.001)), dec!(50));
        // Short receives on positive rate.
        assert_eq!(
            funding_payment(dec!(-1), px("50000"), dec!(0.001)),
            dec!(-50)
        );
    }

    #[test]
    fn settlement_schedule_rolls_forward() {
        let mut state = FundingState::new(8 * 3600, 0);
        let eight_hours = 8 * 3600 * NANOS_PER_SEC;
        assert!(!state.settle_due(eight_hours - 1));
        assert!(state.settle_due(eight_hours));
        assert_eq!(state.next_funding_at, 2 * eight_hours);
        // A long stall still lands on the grid.
        assert!(state.settle_due(5 * eight_hours));
        assert_eq!(state.next_funding_at, 6 * eight_hours);
    }

    #[test]
    fn time_fraction_counts_down() {
        let mut state = FundingState::new(8 * 3600, 0);
        assert_eq!(state.time_to_next_fraction(0), Decimal::ONE);
        let half = 4 * 3600 * NANOS_PER_SEC;
        assert_eq!(state.time_to_next_fraction(half), dec!(0.5));
        assert!(state.settle_due(8 * 3600 * NANOS_PER_SEC));
        assert_eq!(
            state.time_to_next_fraction(8 * 3600 * NANOS_PER_SEC),
            Decimal::ONE
        );
    }

    #[test]
    fn refresh_rate_updates_premium() {
        let mut state = FundingState::new(8 * 3600, 0);
        state.refresh_rate(
            px("50500"),
            px("50000"),
            DEFAULT_INTEREST_RATE,
            DEFAULT_RATE_CAP,
            60,
        );
        assert_eq!(state.premium, dec!(0.01));
        assert!(state.rate > Decimal::ZERO);
        assert_eq!(state.updated_at, 60);
    }
}
