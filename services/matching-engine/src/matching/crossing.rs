//! Price-compatibility predicates

use types::numeric::Price;
use types::order::Side;

/// Can a taker with this limit trade against a maker resting at
/// `maker_price`? A `None` limit (market order) crosses anything.
pub fn taker_crosses(side: Side, limit: Option<Price>, maker_price: Price) -> bool {
    match (side, limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => limit >= maker_price,
        (Side::Sell, Some(limit)) => limit <= maker_price,
    }
}

/// Is `price` within the protective band around `reference`?
/// `band` is a deviation ratio (0.05 = ±5%).
pub fn within_band(side: Side, price: Price, reference: Price, band: rust_decimal::Decimal) -> bool {
    let reference = reference.as_decimal();
    match side {
        // A buyer is protected from paying too much.
        Side::Buy => price.as_decimal() <= reference * (rust_decimal::Decimal::ONE + band),
        // A seller is protected from receiving too little.
        Side::Sell => price.as_decimal() >= reference * (rust_decimal::Decimal::ONE - band),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(s: &str) -> Price {
        s.parse().unwrap()
    }

    #[test]
    fn buy_crosses_at_or_above_ask() {
        assert!(taker_crosses(Side::Buy, Some(px("100")), px("100")));
        assert!(taker_crosses(Side::Buy, Some(px("101")), px("100")));
        assert!(!taker_crosses(Side::Buy, Some(px("99")), px("100")));
    }

    #[test]
    fn sell_crosses_at_or_below_bid() {
        assert!(taker_crosses(Side::Sell, Some(px("100")), px("100")));
        assert!(taker_crosses(Side::Sell, Some(px("99")), px("100")));
        assert!(!taker_crosses(Side::Sell, Some(px("101")), px("100")));
    }

    #[test]
    fn market_crosses_everything() {
        assert!(taker_crosses(Side::Buy, None, px("1000000")));
        assert!(taker_crosses(Side::Sell, None, px("0.01")));
    }

    #[test]
    fn band_bounds_per_side() {
        let reference = px("100");
        assert!(within_band(Side::Buy, px("105"), reference, dec!(0.05)));
        assert!(!within_band(Side::Buy, px("105.01"), reference, dec!(0.05)));
        assert!(within_band(Side::Sell, px("95"), reference, dec!(0.05)));
        assert!(!within_band(Side::Sell, px("94.99"), reference, dec!(0.05)));
    }
}
