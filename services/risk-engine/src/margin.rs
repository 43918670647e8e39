//! Margin methodology
//!
//! All computations are deterministic Decimal arithmetic. Initial margin
//! scales with leverage, maintenance margin with the symbol's MMR.

use rust_decimal::Decimal;

/// `initial_margin = notional / leverage`
pub fn initial_margin(notional: Decimal, leverage: u8) -> Decimal {
    assert!(leverage >= 1, "leverage must be >= 1");
    notional / Decimal::from(leverage)
}

/// `maintenance_margin = notional × mm_rate`
pub fn maintenance_margin(notional: Decimal, mm_rate: Decimal) -> Decimal {
    notional * mm_rate
}

/// Margin requirement for an order before it opens a position.
pub fn order_margin(quantity: Decimal, price: Decimal, leverage: u8) -> Decimal {
    initial_margin(quantity * price, leverage)
}

/// `margin_ratio = equity / notional`, `Decimal::MAX` with no exposure.
pub fn margin_ratio(equity: Decimal, notional: Decimal) -> Decimal {
    if notional.is_zero() {
        Decimal::MAX
    } else {
        equity / notional
    }
}

/// Margin-account availability:
/// `wallet + cross_upl − (position_im + order_im)`
pub fn available_balance(
    wallet: Decimal,
    cross_upl: Decimal,
    position_im: Decimal,
    order_im: Decimal,
) -> Decimal {
    wallet + cross_upl - position_im - order_im
}

pub fn is_leverage_valid(requested: u8, max: u8) -> bool {
    requested >= 1 && requested <= max
}
