//! Risk engine orchestrator
//!
//! Glues the oracle board, funding states, mark prices, position book, and
//! insurance funds behind one handle. Everything here is synchronous and
//! lock-scoped; the facade's background tasks drive the periodic methods.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use types::errors::RejectReason;
use types::ids::{AccountId, MarketId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::position::{Direction, MarginMode};
use types::risk::{InsuranceFund, LiquidationRequest};
use types::symbol::SymbolSpec;

use crate::events::{event_for_health, RiskEvent};
use crate::funding::{self, FundingState};
use crate::liquidation;
use crate::margin;
use crate::mark_price;
use crate::oracle::OracleBoard;
use crate::positions::PositionBook;

/// Global risk parameters.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub interest_rate: Decimal,
    pub rate_cap: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            interest_rate: funding::DEFAULT_INTEREST_RATE,
            rate_cap: funding::DEFAULT_RATE_CAP,
        }
    }
}

/// Derived margin-account view for one owner.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginAccountView {
    pub wallet: Decimal,
    pub position_margin: Decimal,
    pub order_margin: Decimal,
    pub cross_upl: Decimal,
    pub available: Decimal,
}

/// One owner's funding settlement. Positive `payment` means the owner pays.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingTransfer {
    pub owner: AccountId,
    pub payment: Decimal,
}

/// Result of one position-monitor sweep over a symbol.
#[derive(Debug, Clone, Default)]
pub struct MonitorOutcome {
    /// Oracle outside its freshness window: everything suppressed.
    pub stale: bool,
    pub events: Vec<RiskEvent>,
    pub liquidations: Vec<LiquidationRequest>,
}

/// Shared risk state for all perpetual symbols.
#[derive(Debug, Default)]
pub struct RiskEngine {
    config: RiskConfig,
    pub oracle: OracleBoard,
    pub positions: PositionBook,
    marks: DashMap<MarketId, Price>,
    funding: DashMap<MarketId, FundingState>,
    order_margins: DashMap<AccountId, Decimal>,
    insurance: Mutex<HashMap<String, InsuranceFund>>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Initialise funding state when a perpetual symbol is listed.
    pub fn register_symbol(&self, spec: &SymbolSpec, now: i64) {
        if spec.is_perpetual() {
            self.funding
                .entry(spec.market.clone())
                .or_insert_with(|| FundingState::new(spec.funding_interval_secs(), now));
        }
    }

    pub fn mark(&self, symbol: &MarketId) -> Option<Price> {
        self.marks.get(symbol).map(|m| *m)
    }

    pub fn funding_state(&self, symbol: &MarketId) -> Option<FundingState> {
        self.funding.get(symbol).map(|f| f.clone())
    }

    /// Recompute the mark from a fresh index. A stale index freezes the
    /// previous mark and returns None.
    pub fn refresh_mark(&self, spec: &SymbolSpec, now: i64) -> Option<Price> {
        let index = self
            .oracle
            .fresh_index(&spec.market, now, spec.oracle_freshness_secs)?;
        let funding = self.funding.get(&spec.market)?;
        let mark = mark_price::mark_price(index, &funding, now);
        drop(funding);
        self.marks.insert(spec.market.clone(), mark);
        Some(mark)
    }

    /// Recompute the funding rate from the current mark/index premium.
    pub fn refresh_funding_rate(&self, spec: &SymbolSpec, now: i64) -> Option<Decimal> {
        let index = self
            .oracle
            .fresh_index(&spec.market, now, spec.oracle_freshness_secs)?;
        let mark = self.mark(&spec.market).unwrap_or(index);
        let mut funding = self.funding.get_mut(&spec.market)?;
        funding.refresh_rate(mark, index, self.config.interest_rate, self.config.rate_cap, now);
        Some(funding.rate)
    }

    /// Settle funding if a boundary has been crossed. Returns the rate and
    /// the per-owner transfers (positive pays) for the facade to apply to
    /// wallets.
    pub fn settle_funding(&self, spec: &SymbolSpec, now: i64) -> Option<(Decimal, Vec<FundingTransfer>)> {
        let rate = {
            let mut funding = self.funding.get_mut(&spec.market)?;
            if !funding.settle_due(now) {
                return None;
            }
            funding.rate
        };
        let mark = self.mark(&spec.market)?;

        let mut transfers = Vec::new();
        self.positions.for_each_in_symbol(&spec.market, |position| {
            let payment = funding::funding_payment(position.signed_size(), mark, rate);
            if !payment.is_zero() {
                position.funding_paid += payment;
                transfers.push(FundingTransfer {
                    owner: position.owner,
                    payment,
                });
            }
        });
        Some((rate, transfers))
    }

    /// Position-monitor sweep: refresh UPL and liquidation prices, grade
    /// health, and collect positions at or under maintenance.
    pub fn monitor_symbol(
        &self,
        spec: &SymbolSpec,
        now: i64,
        wallet_of: &dyn Fn(AccountId) -> Decimal,
    ) -> MonitorOutcome {
        if self
            .oracle
            .is_stale(&spec.market, now, spec.oracle_freshness_secs)
        {
            return MonitorOutcome {
                stale: true,
                ..MonitorOutcome::default()
            };
        }
        let Some(mark) = self.mark(&spec.market) else {
            return MonitorOutcome::default();
        };
        let mmr = spec.maintenance_margin_rate();

        // Pre-pass: cross-margin owners need the UPL of their *other*
        // positions, which must be read outside the sweep's shard lock.
        let mut cross_owners = Vec::new();
        self.positions.for_each_in_symbol(&spec.market, |position| {
            if position.margin_mode == MarginMode::Cross {
                cross_owners.push(position.owner);
            }
        });
        let cross_upls: HashMap<AccountId, Decimal> = cross_owners
            .into_iter()
            .map(|owner| {
                (
                    owner,
                    self.positions.cross_upl_excluding(owner, &spec.market),
                )
            })
            .collect();

        let mut outcome = MonitorOutcome::default();
        self.positions.for_each_in_symbol(&spec.market, |position| {
            position.refresh_mark(mark, mmr, now);

            let wallet = wallet_of(position.owner);
            let cross_upl = match position.margin_mode {
                MarginMode::Isolated => Decimal::ZERO,
                MarginMode::Cross => cross_upls
                    .get(&position.owner)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
            };
            position.liquidation_price = position.entry_price.and_then(|entry| {
                liquidation::liquidation_price(
                    position.direction,
                    entry,
                    wallet,
                    cross_upl,
                    position.used_margin,
                    mmr,
                    position.size.as_decimal(),
                )
            });

            let ratio = position.margin_ratio(wallet + cross_upl);
            let health = liquidation::health_status(ratio, mmr);
            if let Some(event) =
                event_for_health(position.owner, &spec.market, health, ratio, now)
            {
                outcome.events.push(event);
            }
            if liquidation::should_liquidate(ratio, mmr) {
                outcome.liquidations.push(LiquidationRequest {
                    owner: position.owner,
                    symbol: spec.market.clone(),
                    close_side: match position.direction {
                        Direction::Long => Side::Sell,
                        Direction::Short | Direction::Flat => Side::Buy,
                    },
                    size: position.size,
                    margin_ratio: ratio,
                    attempt: 0,
                    enqueued_at: now,
                });
            }
        });
        outcome
    }

    // ── Pre-trade margin ─────────────────────────────────────────────────

    /// Admission check for a perpetual order. Returns the initial margin to
    /// reserve (zero for reduce-only orders).
    #[allow(clippy::too_many_arguments)]
    pub fn check_perp_admission(
        &self,
        spec: &SymbolSpec,
        owner: AccountId,
        side: Side,
        quantity: Quantity,
        reference_price: Price,
        leverage: u8,
        wallet: Decimal,
        reduce_only: bool,
    ) -> Result<Decimal, RejectReason> {
        if !margin::is_leverage_valid(leverage, spec.max_leverage()) {
            return Err(RejectReason::LeverageExceeded {
                max: spec.max_leverage(),
                requested: leverage,
            });
        }
        if reduce_only {
            if self.positions.would_increase(owner, &spec.market, side) {
                return Err(RejectReason::ReduceOnlyViolation);
            }
            // Oversized reduce-only orders would fill through zero and
            // re-open the other way.
            let (_, size) = self
                .positions
                .open_size(owner, &spec.market)
                .ok_or(RejectReason::ReduceOnlyViolation)?;
            if quantity.as_decimal() > size.as_decimal() {
                return Err(RejectReason::ReduceOnlyViolation);
            }
            return Ok(Decimal::ZERO);
        }

        let order_im = margin::order_margin(
            quantity.as_decimal(),
            reference_price.as_decimal(),
            leverage,
        );
        let view = self.margin_account(owner, wallet);
        if view.available < order_im {
            return Err(RejectReason::InsufficientBalance {
                asset: spec.market.quote().to_string(),
                required: order_im,
                available: view.available,
            });
        }
        Ok(order_im)
    }

    /// Track initial margin held by open (unfilled) orders.
    pub fn reserve_order_margin(&self, owner: AccountId, amount: Decimal) {
        if !amount.is_zero() {
            *self.order_margins.entry(owner).or_insert(Decimal::ZERO) += amount;
        }
    }

    pub fn release_order_margin(&self, owner: AccountId, amount: Decimal) {
        if let Some(mut held) = self.order_margins.get_mut(&owner) {
            *held = (*held - amount).max(Decimal::ZERO);
        }
    }

    /// Derived margin-account view:
    /// `available = wallet + cross_upl − (position_im + order_im)`.
    pub fn margin_account(&self, owner: AccountId, wallet: Decimal) -> MarginAccountView {
        let position_margin = self.positions.position_margin(owner);
        let order_margin = self
            .order_margins
            .get(&owner)
            .map(|m| *m)
            .unwrap_or(Decimal::ZERO);
        let cross_upl = self.positions.total_upl(owner);
        let available =
            margin::available_balance(wallet, cross_upl, position_margin, order_margin);
        MarginAccountView {
            wallet,
            position_margin,
            order_margin,
            cross_upl,
            available,
        }
    }

    // ── Insurance fund ───────────────────────────────────────────────────

    pub fn insurance_contribute(&self, asset: &str, amount: Decimal) {
        let mut funds = self.insurance.lock().expect("insurance poisoned");
        funds
            .entry(asset.to_string())
            .or_insert_with(|| InsuranceFund::new(asset, Decimal::ZERO))
            .contribute(amount);
    }

    pub fn insurance_draw(&self, asset: &str, amount: Decimal) {
        let mut funds = self.insurance.lock().expect("insurance poisoned");
        funds
            .entry(asset.to_string())
            .or_insert_with(|| InsuranceFund::new(asset, Decimal::ZERO))
            .draw(amount);
    }

    pub fn insurance_fund(&self, asset: &str) -> Option<InsuranceFund> {
        let funds = self.insurance.lock().expect("insurance poisoned");
        funds.get(asset).cloned()
    }
}
