//! Per-symbol match engine
//!
//! Owns one order book and the crossing loop: price–time priority, maker
//! pricing, time-in-force resolution, self-trade prevention, and protective
//! bands for market orders.

use rust_decimal::Decimal;
use types::errors::{EngineFault, RejectReason};
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{CancelReason, Order, OrderType, Side, TimeInForce};
use types::symbol::{SelfTradePolicy, SymbolSpec};
use types::trade::Trade;

use crate::book::OrderBook;
use crate::matching::crossing;
use crate::matching::TradeExecutor;

/// A maker-side execution the order store must mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct MakerFill {
    pub order_id: OrderId,
    pub owner: AccountId,
    pub quantity: Quantity,
    pub price: Price,
    /// The maker's book entry is fully consumed.
    pub done: bool,
}

/// A maker removed by self-trade prevention.
#[derive(Debug, Clone, PartialEq)]
pub struct StpCancel {
    pub order_id: OrderId,
    pub owner: AccountId,
    pub price: Price,
    pub remaining: Quantity,
}

/// What happened to the unfilled remainder of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residual {
    /// Nothing left: taker fully filled.
    None,
    /// Remainder rests on the book.
    Rested,
    /// IOC / market remainder cancelled.
    Cancelled,
    /// FOK could not fully fill; no state was touched.
    RejectedFok,
    /// An iceberg slice was consumed while crossing; the caller re-slices.
    SliceExhausted,
    /// Market order stopped by the protective band; remainder rejected.
    RejectedBand,
    /// Self-trade policy cancelled the taker.
    CancelledSelfTrade,
}

/// Result of one submission.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub taker: Order,
    pub trades: Vec<Trade>,
    pub maker_fills: Vec<MakerFill>,
    pub stp_cancels: Vec<StpCancel>,
    pub residual: Residual,
}

/// Matching state for one symbol.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    spec: SymbolSpec,
    book: OrderBook,
    executor: TradeExecutor,
}

impl MatchEngine {
    pub fn new(spec: SymbolSpec) -> Self {
        let book = OrderBook::new(&spec.market);
        Self {
            spec,
            book,
            executor: TradeExecutor::new(1),
        }
    }

    pub fn spec(&self) -> &SymbolSpec {
        &self.spec
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    /// Cross an order against the book, then resolve its time-in-force.
    ///
    /// `visible` caps how much of the order works right now (iceberg slice);
    /// `band` is the effective protective-band ratio for market orders.
    pub fn submit(
        &mut self,
        mut order: Order,
        visible: Option<Quantity>,
        band: Option<Decimal>,
        timestamp: i64,
    ) -> Result<MatchOutcome, EngineFault> {
        let is_market = order.order_type == OrderType::Market || order.price.is_none();
        let band_limit = if is_market {
            self.band_limit(order.side, band)
        } else {
            None
        };

        // FOK is all-or-nothing, decided before any state mutates.
        if order.time_in_force == TimeInForce::Fok {
            let cap = Self::tighter(order.side, order.price, band_limit);
            let available = self.book.available_to(order.side, cap);
            if available < order.remaining().as_decimal() {
                order.reject(RejectReason::UnfillableFok, timestamp);
                return Ok(MatchOutcome {
                    taker: order,
                    trades: Vec::new(),
                    maker_fills: Vec::new(),
                    stp_cancels: Vec::new(),
                    residual: Residual::RejectedFok,
                });
            }
        }

        let mut trades = Vec::new();
        let mut maker_fills = Vec::new();
        let mut stp_cancels = Vec::new();
        let mut slice_left = visible
            .map(|v| v.min(order.remaining()))
            .unwrap_or_else(|| order.remaining());
        let mut band_stopped = false;
        let mut taker_stp = false;

        while !order.is_filled() && !slice_left.is_zero() {
            let Some((maker_price, maker)) = self.book.peek_opposite(order.side) else {
                break;
            };
            if !crossing::taker_crosses(order.side, order.price, maker_price) {
                break;
            }
            if let Some(bound) = band_limit {
                if !crossing::taker_crosses(order.side, Some(bound), maker_price) {
                    band_stopped = true;
                    break;
                }
            }

            if maker.owner == order.owner {
                match self.spec.self_trade_policy {
                    SelfTradePolicy::CancelTaker => {
                        taker_stp = true;
                        break;
                    }
                    SelfTradePolicy::CancelMaker => {
                        if let Some((price, entry)) = self.book.remove_opposite_front(order.side) {
                            stp_cancels.push(StpCancel {
                                order_id: entry.order_id,
                                owner: entry.owner,
                                price,
                                remaining: entry.remaining,
                            });
                        }
                        continue;
                    }
                    SelfTradePolicy::CancelBoth => {
                        if let Some((price, entry)) = self.book.remove_opposite_front(order.side) {
                            stp_cancels.push(StpCancel {
                                order_id: entry.order_id,
                                owner: entry.owner,
                                price,
                                remaining: entry.remaining,
                            });
                        }
                        taker_stp = true;
                        break;
                    }
                }
            }

            let match_qty = slice_left.min(maker.remaining);
            let trade = self.executor.execute(
                self.spec.market.clone(),
                maker.order_id,
                maker.owner,
                order.side.opposite(),
                order.id,
                order.owner,
                maker_price,
                match_qty,
                &self.spec.fees,
                self.spec.is_perpetual(),
                timestamp,
            );
            order.record_fill(match_qty, maker_price, timestamp);
            let done = self.book.fill_opposite_front(order.side, match_qty);
            self.book.record_trade(maker_price, match_qty, timestamp);
            maker_fills.push(MakerFill {
                order_id: maker.order_id,
                owner: maker.owner,
                quantity: match_qty,
                price: maker_price,
                done,
            });
            trades.push(trade);
            slice_left = slice_left
                .checked_sub(match_qty)
                .unwrap_or(Quantity::zero());
        }

        let residual = self.settle_residual(
            &mut order,
            slice_left,
            visible.is_some(),
            is_market,
            band_stopped,
            taker_stp,
            timestamp,
        );

        if self.book.is_crossed() {
            return Err(EngineFault::CrossedBook {
                symbol: self.spec.market.to_string(),
            });
        }

        Ok(MatchOutcome {
            taker: order,
            trades,
            maker_fills,
            stp_cancels,
            residual,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn settle_residual(
        &mut self,
        order: &mut Order,
        slice_left: Quantity,
        sliced: bool,
        is_market: bool,
        band_stopped: bool,
        taker_stp: bool,
        timestamp: i64,
    ) -> Residual {
        if order.is_filled() {
            return Residual::None;
        }
        if taker_stp {
            order.cancel(CancelReason::SelfTrade, timestamp);
            return Residual::CancelledSelfTrade;
        }
        if band_stopped {
            order.reject(RejectReason::PriceOutsideBand, timestamp);
            return Residual::RejectedBand;
        }
        if is_market || order.time_in_force == TimeInForce::Ioc {
            order.cancel(CancelReason::ImmediateOrCancel, timestamp);
            return Residual::Cancelled;
        }
        if sliced && slice_left.is_zero() {
            return Residual::SliceExhausted;
        }

        // GTC / GTD limit remainder rests at its limit price.
        let price = order.price.expect("resting order needs a price");
        self.book
            .rest(order.id, order.owner, order.side, price, slice_left);
        order.open(timestamp);
        Residual::Rested
    }

    /// Cancel a resting order. Returns (side, price, remaining).
    pub fn cancel(&mut self, order_id: &OrderId) -> Option<(Side, Price, Quantity)> {
        self.book.cancel(order_id)
    }

    fn band_limit(&self, side: Side, band: Option<Decimal>) -> Option<Price> {
        let band = band?;
        let reference = self.book.last_trade()?;
        let bound = match side {
            Side::Buy => reference.as_decimal() * (Decimal::ONE + band),
            Side::Sell => reference.as_decimal() * (Decimal::ONE - band),
        };
        Price::try_new(bound)
    }

    /// The more restrictive of a limit price and a band bound.
    fn tighter(side: Side, limit: Option<Price>, band: Option<Price>) -> Option<Price> {
        match (limit, band) {
            (Some(l), Some(b)) => Some(match side {
                Side::Buy => l.min(b),
                Side::Sell => l.max(b),
            }),
            (Some(l), None) => Some(l),
            (None, bound) => bound,
        }
    }
}
