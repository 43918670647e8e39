//! Perpetual futures positions
//!
//! Position accounting on fills: extending re-weights the entry VWAP,
//! reducing realizes P&L against the entry, and filling through zero closes
//! the old position and opens the residual in the other direction at the
//! fill price.

use crate::ids::{AccountId, MarketId, PositionId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Isolated margin pins collateral per position; cross pools the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// Direction of exposure. Flat if and only if size is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// +1 for long, -1 for short, 0 flat.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => -Decimal::ONE,
            Direction::Flat => Decimal::ZERO,
        }
    }

    fn from_fill(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Long,
            Side::Sell => Direction::Short,
        }
    }
}

/// One perpetual position per (owner, symbol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: AccountId,
    pub symbol: MarketId,
    pub direction: Direction,
    pub size: Quantity,
    pub entry_price: Option<Price>,
    pub margin_mode: MarginMode,
    pub leverage: u8,
    pub used_margin: Decimal,
    pub realized_pnl: Decimal,
    pub funding_paid: Decimal,
    pub maintenance_margin: Decimal,
    pub liquidation_price: Option<Price>,
    pub mark_price: Option<Price>,
    pub unrealized_pnl: Decimal,
    pub opened_at: i64,
    pub updated_at: i64,
}

impl Position {
    pub fn flat(
        owner: AccountId,
        symbol: MarketId,
        margin_mode: MarginMode,
        leverage: u8,
        timestamp: i64,
    ) -> Self {
        Self {
            id: PositionId::new(),
            owner,
            symbol,
            direction: Direction::Flat,
            size: Quantity::zero(),
            entry_price: None,
            margin_mode,
            leverage,
            used_margin: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            funding_paid: Decimal::ZERO,
            maintenance_margin: Decimal::ZERO,
            liquidation_price: None,
            mark_price: None,
            unrealized_pnl: Decimal::ZERO,
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Signed size: positive long, negative short.
    pub fn signed_size(&self) -> Decimal {
        self.direction.sign() * self.size.as_decimal()
    }

    /// Notional at a given price.
    pub fn notional(&self, at: Price) -> Decimal {
        self.size.notional(at)
    }

    /// Unrealized P&L at a mark.
    pub fn unrealized_at(&self, mark: Price) -> Decimal {
        match self.entry_price {
            Some(entry) => {
                (mark.as_decimal() - entry.as_decimal()) * self.signed_size()
            }
            None => Decimal::ZERO,
        }
    }

    /// Would a fill on `side` grow the absolute position?
    pub fn fill_increases(&self, side: Side) -> bool {
        match self.direction {
            Direction::Flat => true,
            Direction::Long => side == Side::Buy,
            Direction::Short => side == Side::Sell,
        }
    }

    /// Apply a fill. Returns the realized P&L delta.
    pub fn apply_fill(&mut self, side: Side, quantity: Quantity, price: Price, timestamp: i64) -> Decimal {
        let realized = if self.fill_increases(side) {
            self.extend(side, quantity, price);
            Decimal::ZERO
        } else {
            self.reduce(side, quantity, price, timestamp)
        };

        self.used_margin = match self.entry_price {
            Some(entry) => self.notional(entry) / Decimal::from(self.leverage.max(1)),
            None => Decimal::ZERO,
        };
        self.realized_pnl += realized;
        self.updated_at = timestamp;
        realized
    }

    fn extend(&mut self, side: Side, quantity: Quantity, price: Price) {
        match self.entry_price {
            None => {
                self.direction = Direction::from_fill(side);
                self.size = quantity;
                self.entry_price = Some(price);
            }
            Some(entry) => {
                let total = self.size + quantity;
                let vwap = (entry.as_decimal() * self.size.as_decimal()
                    + price.as_decimal() * quantity.as_decimal())
                    / total.as_decimal();
                self.size = total;
                self.entry_price = Some(Price::new(vwap));
            }
        }
    }

    fn reduce(&mut self, side: Side, quantity: Quantity, price: Price, timestamp: i64) -> Decimal {
        let entry = self.entry_price.expect("reducing a flat position");
        let per_unit = (price.as_decimal() - entry.as_decimal()) * self.direction.sign();

        if quantity.as_decimal() < self.size.as_decimal() {
            self.size = self.size - quantity;
            return per_unit * quantity.as_decimal();
        }

        // Close fully, then reopen any residual in the other direction.
        let closed = self.size;
        let realized = per_unit * closed.as_decimal();
        let residual = quantity.checked_sub(closed).unwrap_or(Quantity::zero());

        if residual.is_zero() {
            self.direction = Direction::Flat;
            self.size = Quantity::zero();
            self.entry_price = None;
            self.mark_price = None;
            self.unrealized_pnl = Decimal::ZERO;
            self.liquidation_price = None;
        } else {
            self.direction = Direction::from_fill(side);
            self.size = residual;
            self.entry_price = Some(price);
            self.opened_at = timestamp;
        }
        realized
    }

    /// Refresh mark-dependent fields.
    pub fn refresh_mark(&mut self, mark: Price, maintenance_margin_rate: Decimal, timestamp: i64) {
        self.mark_price = Some(mark);
        self.unrealized_pnl = self.unrealized_at(mark);
        self.maintenance_margin = self.notional(mark) * maintenance_margin_rate;
        self.updated_at = timestamp;
    }

    /// Margin ratio = (collateral + UPL) / mark notional.
    ///
    /// `Decimal::MAX` when flat or before the first mark.
    pub fn margin_ratio(&self, collateral: Decimal) -> Decimal {
        let Some(mark) = self.mark_price else {
            return Decimal::MAX;
        };
        let notional = self.notional(mark);
        if notional.is_zero() {
            return Decimal::MAX;
        }
        (collateral + self.unrealized_at(mark)) / notional
    }
}
