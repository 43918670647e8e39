//! Trade construction
//!
//! Assigns the per-symbol monotonic sequence and computes fees in the asset
//! each party receives: base for the buyer, quote for the seller.

use rust_decimal::Decimal;
use types::fee::FeeSchedule;
use types::ids::{AccountId, MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// Builds trades with a monotonically increasing sequence.
#[derive(Debug, Clone)]
pub struct TradeExecutor {
    next_sequence: u64,
}

impl TradeExecutor {
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            next_sequence: starting_sequence,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Emit one trade at the maker's resting price.
    ///
    /// `quote_fees` switches both fees to quote notional (linear
    /// perpetuals settle fees in quote; spot fees follow the received
    /// asset).
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        symbol: MarketId,
        maker_order_id: OrderId,
        maker_owner: AccountId,
        maker_side: Side,
        taker_order_id: OrderId,
        taker_owner: AccountId,
        price: Price,
        quantity: Quantity,
        fees: &FeeSchedule,
        quote_fees: bool,
        timestamp: i64,
    ) -> Trade {
        let (maker_fee, taker_fee) = if quote_fees {
            let notional = quantity.notional(price);
            (fees.maker_fee(notional), fees.taker_fee(notional))
        } else {
            Self::fees(maker_side, price, quantity, fees)
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Trade::new(
            sequence,
            symbol,
            maker_order_id,
            taker_order_id,
            maker_owner,
            taker_owner,
            maker_side,
            price,
            quantity,
            maker_fee,
            taker_fee,
            timestamp,
        )
    }

    /// Fee amounts in each party's received asset.
    ///
    /// The buyer receives base, so a buy-side fee is a base quantity; the
    /// seller receives quote, so a sell-side fee is a quote notional.
    fn fees(
        maker_side: Side,
        price: Price,
        quantity: Quantity,
        fees: &FeeSchedule,
    ) -> (Decimal, Decimal) {
        let base = quantity.as_decimal();
        let quote = quantity.notional(price);
        match maker_side {
            Side::Buy => (fees.maker_fee(base), fees.taker_fee(quote)),
            Side::Sell => (fees.maker_fee(quote), fees.taker_fee(base)),
        }
    }
}
