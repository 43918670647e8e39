//! Order intent and lifecycle types

use crate::errors::RejectReason;
use crate::ids::{AccountId, MarketId, OrderId};
use crate::numeric::{Price, Quantity};
use crate::position::MarginMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type. Everything beyond Market/Limit is a triggered or managed
/// shell over those two primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// Triggers a market order when the reference crosses the stop.
    Stop,
    /// Triggers a limit order when the reference crosses the stop.
    StopLimit,
    /// Stop whose trigger ratchets with the reference price.
    TrailingStop,
    /// Rests only `display_size` at a time.
    Iceberg,
    /// Limit parent with contingent stop-loss / take-profit children.
    Bracket,
    /// One leg of a one-cancels-other pair.
    Oco,
}

/// How long an order remains active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-till-cancel
    Gtc,
    /// Immediate-or-cancel: match what crosses now, cancel the rest
    Ioc,
    /// Fill-or-kill: all-or-nothing, evaluated atomically at admission
    Fok,
    /// Good-till-date: expires at the given Unix-nanos instant
    Gtd(i64),
}

/// Which reference price drives stop triggers and trailing adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingPrice {
    Mark,
    Last,
}

/// Trailing distance, absolute or relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailBy {
    Amount(Decimal),
    /// Fraction of the reference price, e.g. 0.02 trails by 2%.
    Percent(Decimal),
}

impl TrailBy {
    /// Distance in price units at the given reference.
    pub fn distance(&self, reference: Price) -> Decimal {
        match self {
            TrailBy::Amount(amount) => *amount,
            TrailBy::Percent(pct) => reference.as_decimal() * pct,
        }
    }
}

/// Why an order was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    UserRequested,
    /// IOC residual after crossing.
    ImmediateOrCancel,
    SelfTrade,
    /// Bracket/OCO propagation: the linked order filled or was cancelled.
    LinkedOrder,
    Amended,
    System,
}

/// Order lifecycle status. Filled, Cancelled, Rejected, and Expired are
/// terminal: once entered, no field of the order mutates again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    /// Accepted but not yet working (triggered shells wait here).
    #[serde(rename = "PENDING")]
    Pending,
    /// Resting on the book or armed for matching.
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "CANCELLED")]
    Cancelled(CancelReason),
    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled(_)
                | OrderStatus::Rejected(_)
                | OrderStatus::Expired
        )
    }
}

/// Contingent child prices for a bracket parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketSpec {
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
}

/// Raw client intent, validated by the facade before an [`Order`] exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: Option<String>,
    pub owner: AccountId,
    pub symbol: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub trail: Option<TrailBy>,
    pub display_size: Option<Decimal>,
    pub reduce_only: bool,
    pub close_position: bool,
    pub working_price: WorkingPrice,
    pub leverage: u8,
    pub margin_mode: MarginMode,
    pub bracket: Option<BracketSpec>,
}

impl OrderRequest {
    pub fn limit(
        owner: AccountId,
        symbol: MarketId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_id: None,
            owner,
            symbol,
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            quantity,
            price: Some(price),
            stop_price: None,
            trail: None,
            display_size: None,
            reduce_only: false,
            close_position: false,
            working_price: WorkingPrice::Last,
            leverage: 1,
            margin_mode: MarginMode::Isolated,
            bracket: None,
        }
    }

    pub fn market(owner: AccountId, symbol: MarketId, side: Side, quantity: Decimal) -> Self {
        Self {
            order_type: OrderType::Market,
            price: None,
            ..Self::limit(owner, symbol, side, Decimal::ONE, quantity)
        }
    }

    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_stop(mut self, order_type: OrderType, stop_price: Decimal) -> Self {
        self.order_type = order_type;
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_trail(mut self, trail: TrailBy) -> Self {
        self.order_type = OrderType::TrailingStop;
        self.trail = Some(trail);
        self
    }

    pub fn with_display(mut self, display_size: Decimal) -> Self {
        self.order_type = OrderType::Iceberg;
        self.display_size = Some(display_size);
        self
    }

    pub fn with_leverage(mut self, leverage: u8) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// A live order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: Option<String>,
    pub owner: AccountId,
    pub symbol: MarketId,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Limit price. `None` for market orders and un-triggered market shells.
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub trail: Option<TrailBy>,
    pub display_size: Option<Quantity>,
    /// Child prices for a bracket parent, consumed at the first fill.
    pub bracket: Option<BracketSpec>,
    pub reduce_only: bool,
    pub close_position: bool,
    pub working_price: WorkingPrice,
    pub leverage: u8,
    pub margin_mode: MarginMode,
    pub quantity: Quantity,
    pub filled: Quantity,
    pub avg_fill_price: Option<Price>,
    pub status: OrderStatus,
    pub parent_id: Option<OrderId>,
    pub child_ids: Vec<OrderId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn new(
        owner: AccountId,
        symbol: MarketId,
        side: Side,
        order_type: OrderType,
        time_in_force: TimeInForce,
        price: Option<Price>,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self {
            id: OrderId::new(),
            client_id: None,
            owner,
            symbol,
            side,
            order_type,
            time_in_force,
            price,
            stop_price: None,
            trail: None,
            display_size: None,
            bracket: None,
            reduce_only: false,
            close_position: false,
            working_price: WorkingPrice::Last,
            leverage: 1,
            margin_mode: MarginMode::Isolated,
            quantity,
            filled: Quantity::zero(),
            avg_fill_price: None,
            status: OrderStatus::Pending,
            parent_id: None,
            child_ids: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn remaining(&self) -> Quantity {
        self.quantity
            .checked_sub(self.filled)
            .unwrap_or(Quantity::zero())
    }

    pub fn is_filled(&self) -> bool {
        self.filled == self.quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record an execution and roll the average fill price forward.
    ///
    /// # Panics
    /// Panics on over-fill or fills against a terminal order; both are
    /// engine bugs, not client errors.
    pub fn record_fill(&mut self, quantity: Quantity, price: Price, timestamp: i64) {
        assert!(!self.is_terminal(), "fill against terminal order");
        let new_filled = self.filled + quantity;
        assert!(
            new_filled.as_decimal() <= self.quantity.as_decimal(),
            "fill exceeds order quantity"
        );

        self.avg_fill_price = Some(match self.avg_fill_price {
            None => price,
            Some(avg) => {
                let prior = avg.as_decimal() * self.filled.as_decimal();
                let added = price.as_decimal() * quantity.as_decimal();
                Price::new((prior + added) / new_filled.as_decimal())
            }
        });
        self.filled = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = timestamp;
    }

    pub fn open(&mut self, timestamp: i64) {
        assert!(!self.is_terminal(), "cannot open terminal order");
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::Open;
            self.updated_at = timestamp;
        }
    }

    /// # Panics
    /// Panics when already terminal; callers check first.
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) {
        assert!(!self.is_terminal(), "cannot cancel terminal order");
        self.status = OrderStatus::Cancelled(reason);
        self.updated_at = timestamp;
    }

    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) {
        assert!(!self.is_terminal(), "cannot reject terminal order");
        self.status = OrderStatus::Rejected(reason);
        self.updated_at = timestamp;
    }

    pub fn expire(&mut self, timestamp: i64) {
        assert!(!self.is_terminal(), "cannot expire terminal order");
        self.status = OrderStatus::Expired;
        self.updated_at = timestamp;
    }
}
