//! Immutable trade records
//!
//! A trade identifies both real orders: the resting maker and the incoming
//! taker. Synthetic placeholder ids never appear in the log.

use crate::ids::{AccountId, MarketId, OrderId, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One execution between a maker and a taker. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Per-symbol monotonic sequence; the trade log replays in this order.
    pub sequence: u64,
    pub symbol: MarketId,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_owner: AccountId,
    pub taker_owner: AccountId,
    /// Side of the resting order.
    pub maker_side: Side,
    /// Execution price: always the maker's resting price.
    pub price: Price,
    pub quantity: Quantity,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub executed_at: i64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: MarketId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_owner: AccountId,
        taker_owner: AccountId,
        maker_side: Side,
        price: Price,
        quantity: Quantity,
        maker_fee: Decimal,
        taker_fee: Decimal,
        executed_at: i64,
    ) -> Self {
        Self {
            id: TradeId::new(),
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
            executed_at,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.quantity.notional(self.price)
    }

    /// Order id on the buy side of this trade.
    pub fn buy_order_id(&self) -> OrderId {
        match self.maker_side {
            Side::Buy => self.maker_order_id,
            Side::Sell => self.taker_order_id,
        }
    }

    /// Order id on the sell side of this trade.
    pub fn sell_order_id(&self) -> OrderId {
        match self.maker_side {
            Side::Buy => self.taker_order_id,
            Side::Sell => self.maker_order_id,
        }
    }

    /// Owner receiving base in this trade.
    pub fn buyer(&self) -> AccountId {
        match self.maker_side {
            Side::Buy => self.maker_owner,
            Side::Sell => self.taker_owner,
        }
    }

    /// Owner receiving quote in this trade.
    pub fn seller(&self) -> AccountId {
        match self.maker_side {
            Side::Buy => self.taker_owner,
            Side::Sell => self.maker_owner,
        }
    }
}
