//! Engine facade
//!
//! Entry points for submit/cancel/amend and the read-side views. Each
//! symbol is one shard: an atomic admission gauge, a halt flag, and a mutex
//! around the matching state. Calls are synchronous; everything a fill
//! implies (ledger movement, position update, linked-order propagation,
//! trigger sweeps) happens inside the same per-symbol critical section as
//! the trade emission.

use dashmap::DashMap;
use market_data::{capture_levels, diff_levels, BookDelta, DepthSnapshot, SequenceGen, TradeTape};
use matching_engine::{MatchEngine, MatchOutcome, Residual};
use risk_engine::liquidator::{backoff_delay, MAX_ATTEMPTS};
use risk_engine::{liquidation, liquidation_channel, LiquidationQueue, RiskConfig, RiskEngine};
use options_engine::OptionChain;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{error, warn};
use types::account::AccountBalances;
use types::errors::{CancelError, EngineError, EngineFault, RejectReason};
use types::ids::{AccountId, MarketId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{
    CancelReason, Order, OrderRequest, OrderType, Side, TimeInForce, WorkingPrice,
};
use types::position::Position;
use types::risk::{Liquidation, LiquidationRequest};
use types::symbol::SymbolSpec;
use types::trade::Trade;

use crate::expiry::ExpiryQueue;
use crate::ledger::Ledger;
use crate::linked::{BracketChildren, LinkRegistry};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::triggers::{TriggerBook, TriggerState};

/// Global engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Admissions in flight per symbol before `OVERLOADED` rejections.
    pub admission_high_water: usize,
    pub liquidation_queue_capacity: usize,
    /// Band applied to market orders when the symbol declares none.
    pub default_max_slippage: Option<Decimal>,
    /// Annualized rate fed to the options pricer.
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission_high_water: 1024,
            liquidation_queue_capacity: 256,
            default_max_slippage: None,
            risk_free_rate: 0.05,
        }
    }
}

/// Market statistics view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub symbol: String,
    pub last_price: Option<Price>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Decimal>,
    pub session_volume: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: i64,
}

/// What an open order still holds.
#[derive(Debug, Clone)]
enum Reservation {
    /// Ledger value moved to `reserved` at admission.
    Spot {
        owner: AccountId,
        asset: String,
        remaining: Decimal,
    },
    /// Initial margin counted against the margin account.
    Margin { owner: AccountId, per_unit: Decimal, remaining: Decimal },
}

enum Disposition {
    Cancel(CancelReason),
    Expire,
}

/// Matching state guarded by the per-symbol mutex.
struct SymbolCore {
    engine: MatchEngine,
    orders: HashMap<OrderId, Order>,
    reservations: HashMap<OrderId, Reservation>,
    triggers: TriggerBook,
    links: LinkRegistry,
    expiry: ExpiryQueue,
    seq: SequenceGen,
    tape: TradeTape,
    trade_log: Vec<Trade>,
    deltas: Vec<BookDelta>,
}

struct SymbolShard {
    spec: SymbolSpec,
    pending: AtomicUsize,
    halted: AtomicBool,
    core: Mutex<SymbolCore>,
}

/// The trade-execution facade.
pub struct Exchange {
    config: EngineConfig,
    symbols: DashMap<MarketId, Arc<SymbolShard>>,
    order_index: DashMap<OrderId, MarketId>,
    ledger: Ledger,
    risk: RiskEngine,
    options: OptionChain,
    stats: EngineStats,
    liq_queue: LiquidationQueue,
    liq_rx: Mutex<Option<mpsc::Receiver<LiquidationRequest>>>,
    liquidations: Mutex<Vec<Liquidation>>,
}

/// Current Unix time in nanoseconds.
pub fn unix_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

impl Exchange {
    pub fn new(config: EngineConfig) -> Self {
        let (liq_queue, liq_rx) = liquidation_channel(config.liquidation_queue_capacity);
        let options = OptionChain::new(config.risk_free_rate);
        Self {
            config,
            symbols: DashMap::new(),
            order_index: DashMap::new(),
            ledger: Ledger::new(),
            risk: RiskEngine::new(RiskConfig::default()),
            options,
            stats: EngineStats::new(),
            liq_queue,
            liq_rx: Mutex::new(Some(liq_rx)),
            liquidations: Mutex::new(Vec::new()),
        }
    }

    pub fn list_symbol(&self, spec: SymbolSpec, now: i64) {
        self.risk.register_symbol(&spec, now);
        let core = SymbolCore {
            engine: MatchEngine::new(spec.clone()),
            orders: HashMap::new(),
            reservations: HashMap::new(),
            triggers: TriggerBook::new(),
            links: LinkRegistry::new(),
            expiry: ExpiryQueue::new(),
            seq: SequenceGen::new(),
            tape: TradeTape::new(1024),
            trade_log: Vec::new(),
            deltas: Vec::new(),
        };
        let shard = SymbolShard {
            spec: spec.clone(),
            pending: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
            core: Mutex::new(core),
        };
        self.symbols.insert(spec.market, Arc::new(shard));
    }

    pub fn symbols(&self) -> Vec<SymbolSpec> {
        self.symbols.iter().map(|s| s.spec.clone()).collect()
    }

    pub fn spec(&self, symbol: &MarketId) -> Option<SymbolSpec> {
        self.symbols.get(symbol).map(|s| s.spec.clone())
    }

    pub fn deposit(&self, owner: AccountId, asset: &str, amount: Decimal) {
        self.ledger.deposit(owner, asset, amount);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    pub fn options(&self) -> &OptionChain {
        &self.options
    }

    pub fn liquidation_queue(&self) -> LiquidationQueue {
        self.liq_queue.clone()
    }

    /// Receiver half of the liquidation channel; the worker takes it once.
    pub fn take_liquidation_rx(&self) -> Option<mpsc::Receiver<LiquidationRequest>> {
        self.liq_rx.lock().expect("liq rx poisoned").take()
    }

    /// Oracle ingress: a fresh index observation for one symbol.
    pub fn update_index(&self, symbol: &MarketId, price: Decimal, now: i64) -> Result<(), RejectReason> {
        let price = Price::try_new(price).ok_or_else(|| RejectReason::InvalidOrder {
            detail: "index price must be positive".into(),
        })?;
        self.risk.oracle.update(symbol.clone(), price, now);
        Ok(())
    }

    // ── Submission ───────────────────────────────────────────────────────

    pub fn submit(&self, request: OrderRequest) -> Result<OrderId, RejectReason> {
        self.submit_at(request, unix_now_ns())
    }

    pub fn submit_at(&self, request: OrderRequest, now: i64) -> Result<OrderId, RejectReason> {
        let started = Instant::now();
        let result = self.submit_inner(request, now);
        self.stats.record_order(started.elapsed().as_nanos() as u64);
        result
    }

    /// Submit a one-cancels-other pair. Any fill or cancel on either leg
    /// cancels the other.
    pub fn submit_oco(
        &self,
        first: OrderRequest,
        second: OrderRequest,
    ) -> Result<(OrderId, OrderId), RejectReason> {
        self.submit_oco_at(first, second, unix_now_ns())
    }

    pub fn submit_oco_at(
        &self,
        mut first: OrderRequest,
        mut second: OrderRequest,
        now: i64,
    ) -> Result<(OrderId, OrderId), RejectReason> {
        if first.symbol != second.symbol {
            return Err(RejectReason::InvalidOrder {
                detail: "OCO legs must share a symbol".into(),
            });
        }
        let symbol = first.symbol.clone();
        first.order_type = OrderType::Oco;
        second.order_type = OrderType::Oco;

        let first_id = self.submit_at(first, now)?;
        let first_filled = self
            .order(&first_id)
            .map(|o| !o.filled.is_zero())
            .unwrap_or(false);

        if first_filled {
            // Any fill on one leg cancels the other: the second leg never
            // becomes live.
            let shard = self
                .symbols
                .get(&symbol)
                .map(|s| s.clone())
                .ok_or_else(|| RejectReason::UnknownSymbol {
                    symbol: symbol.to_string(),
                })?;
            let mut core = self.lock_core(&shard, now);
            let spec = shard.spec.clone();
            let mut order = self.build_order(&spec, &core, second, now)?;
            order.cancel(CancelReason::LinkedOrder, now);
            let second_id = order.id;
            core.orders.insert(second_id, order);
            self.order_index.insert(second_id, spec.market);
            return Ok((first_id, second_id));
        }

        let second_id = self.submit_at(second, now)?;

        let shard = self.symbols.get(&symbol).map(|s| s.clone());
        if let Some(shard) = shard {
            let mut core = self.lock_core(&shard, now);
            let second_filled = core
                .orders
                .get(&second_id)
                .map(|o| !o.filled.is_zero())
                .unwrap_or(false);
            let first_live = core
                .orders
                .get(&first_id)
                .map(|o| !o.is_terminal())
                .unwrap_or(false);
            if second_filled && first_live {
                self.cancel_internal(
                    &shard,
                    &mut core,
                    first_id,
                    Disposition::Cancel(CancelReason::LinkedOrder),
                    true,
                    now,
                );
            } else {
                let second_live = core
                    .orders
                    .get(&second_id)
                    .map(|o| !o.is_terminal())
                    .unwrap_or(false);
                if first_live && second_live {
                    core.links.register_oco(first_id, second_id);
                }
            }
        }
        Ok((first_id, second_id))
    }

    fn submit_inner(&self, request: OrderRequest, now: i64) -> Result<OrderId, RejectReason> {
        let shard = self
            .symbols
            .get(&request.symbol)
            .map(|s| s.clone())
            .ok_or_else(|| RejectReason::UnknownSymbol {
                symbol: request.symbol.to_string(),
            })?;
        if shard.halted.load(Ordering::Acquire) {
            return Err(RejectReason::SymbolHalted);
        }

        let backlog = shard.pending.fetch_add(1, Ordering::AcqRel);
        let result = (|| {
            if backlog >= self.config.admission_high_water {
                return Err(RejectReason::Overloaded);
            }
            let spec = shard.spec.clone();
            let mut core = self.lock_core(&shard, now);
            let order = self.build_order(&spec, &core, request, now)?;
            let id = order.id;
            match order.order_type {
                OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop => {
                    self.admit_shell(&shard, &mut core, order, now)?
                }
                _ => self.admit_working(&shard, &mut core, order, false, now)?,
            };
            self.order_index.insert(id, spec.market.clone());
            Ok(id)
        })();
        shard.pending.fetch_sub(1, Ordering::AcqRel);
        result
    }

    /// Lock the symbol core and settle due GTD expiries first, so an order
    /// expiring at T is gone before any admission timestamped after T.
    fn lock_core<'a>(&self, shard: &'a SymbolShard, now: i64) -> MutexGuard<'a, SymbolCore> {
        let mut core = shard.core.lock().expect("symbol core poisoned");
        self.expire_due(shard, &mut core, now);
        core
    }

    fn expire_due(&self, shard: &SymbolShard, core: &mut SymbolCore, now: i64) {
        let due = core.expiry.due(now);
        if due.is_empty() {
            return;
        }
        let before = capture_levels(core.engine.book());
        for id in due {
            self.cancel_internal(shard, core, id, Disposition::Expire, true, now);
        }
        self.emit_deltas(core, before, now);
    }

    /// Validate a raw request against the symbol spec and build the order.
    fn build_order(
        &self,
        spec: &SymbolSpec,
        _core: &SymbolCore,
        request: OrderRequest,
        now: i64,
    ) -> Result<Order, RejectReason> {
        if !spec.is_perpetual() && (request.reduce_only || request.close_position) {
            return Err(RejectReason::InvalidOrder {
                detail: "reduce-only and close-position apply to perpetuals".into(),
            });
        }

        // Close-position derives side and size from the live position.
        let (side, quantity, reduce_only) = if request.close_position {
            let (direction, size) = self
                .risk
                .positions
                .open_size(request.owner, &spec.market)
                .ok_or(RejectReason::NoPosition)?;
            let side = match direction {
                types::position::Direction::Long => Side::Sell,
                _ => Side::Buy,
            };
            (side, size, true)
        } else {
            (
                request.side,
                spec.validate_quantity(request.quantity)?,
                request.reduce_only,
            )
        };

        let needs_limit_price = matches!(
            request.order_type,
            OrderType::Limit
                | OrderType::StopLimit
                | OrderType::Iceberg
                | OrderType::Bracket
                | OrderType::Oco
        );
        let price = if needs_limit_price {
            let raw = request.price.ok_or_else(|| RejectReason::InvalidOrder {
                detail: "limit price required".into(),
            })?;
            Some(spec.validate_price(raw)?)
        } else {
            None
        };

        let stop_price = match request.order_type {
            OrderType::Stop | OrderType::StopLimit => {
                let raw = request.stop_price.ok_or_else(|| RejectReason::InvalidOrder {
                    detail: "stop price required".into(),
                })?;
                Some(spec.validate_price(raw)?)
            }
            OrderType::TrailingStop => match request.stop_price {
                Some(raw) => Some(spec.validate_price(raw)?),
                None => None, // derived from the reference at admission
            },
            _ => None,
        };

        if request.order_type == OrderType::TrailingStop && request.trail.is_none() {
            return Err(RejectReason::InvalidOrder {
                detail: "trailing stop requires a trail".into(),
            });
        }

        let display_size = if request.order_type == OrderType::Iceberg {
            let raw = request.display_size.ok_or_else(|| RejectReason::InvalidOrder {
                detail: "iceberg requires a display size".into(),
            })?;
            let display = spec.validate_quantity(raw)?;
            if display.as_decimal() > quantity.as_decimal() {
                return Err(RejectReason::InvalidOrder {
                    detail: "display size exceeds quantity".into(),
                });
            }
            Some(display)
        } else {
            None
        };

        let bracket = if request.order_type == OrderType::Bracket {
            let spec_b = request.bracket.ok_or_else(|| RejectReason::InvalidOrder {
                detail: "bracket requires child prices".into(),
            })?;
            spec.validate_price(spec_b.take_profit)?;
            spec.validate_price(spec_b.stop_loss)?;
            Some(spec_b)
        } else {
            None
        };

        let mut order = Order::new(
            request.owner,
            spec.market.clone(),
            side,
            request.order_type,
            request.time_in_force,
            price,
            quantity,
            now,
        );
        order.client_id = request.client_id;
        order.stop_price = stop_price;
        order.trail = request.trail;
        order.display_size = display_size;
        order.bracket = bracket;
        order.reduce_only = reduce_only;
        order.close_position = request.close_position;
        order.working_price = request.working_price;
        order.leverage = request.leverage.max(1);
        order.margin_mode = request.margin_mode;
        Ok(order)
    }

    // ── Working orders (market / limit / iceberg / bracket / OCO legs) ──

    fn admit_working(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        order: Order,
        forced: bool,
        now: i64,
    ) -> Result<OrderId, RejectReason> {
        let spec = &shard.spec;
        let band = self.effective_band(spec);

        // FOK is decided before anything is reserved or touched.
        if order.time_in_force == TimeInForce::Fok {
            let available = core.engine.book().available_to(order.side, order.price);
            if available < order.remaining().as_decimal() {
                return Err(RejectReason::UnfillableFok);
            }
        }

        if !forced {
            self.reserve_for(core, spec, &order)?;
        }
        if order.order_type == OrderType::Bracket {
            if let Some(bracket) = order.bracket {
                core.links.register_pending_bracket(order.id, bracket);
            }
        }

        let before = capture_levels(core.engine.book());
        let visible = order
            .display_size
            .map(|display| display.min(order.remaining()));

        let mut outcome = match core.engine.submit(order, visible, band, now) {
            Ok(outcome) => outcome,
            Err(fault) => {
                self.halt(shard, &fault);
                return Err(RejectReason::SymbolHalted);
            }
        };
        // A taker iceberg whose slice is consumed keeps crossing slice by
        // slice, each with fresh priority.
        while outcome.residual == Residual::SliceExhausted {
            let next = outcome
                .taker
                .display_size
                .expect("slice residual without display size")
                .min(outcome.taker.remaining());
            outcome = match core.engine.submit(outcome.taker, Some(next), band, now) {
                Ok(outcome) => outcome,
                Err(fault) => {
                    self.halt(shard, &fault);
                    return Err(RejectReason::SymbolHalted);
                }
            };
        }

        let id = self.apply_outcome(shard, core, outcome, now)?;
        self.emit_deltas(core, before, now);
        Ok(id)
    }

    /// Mirror a finished crossing into orders, ledger, positions, links,
    /// and triggers.
    fn apply_outcome(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        outcome: MatchOutcome,
        now: i64,
    ) -> Result<OrderId, RejectReason> {
        let spec = &shard.spec;
        let taker = outcome.taker;
        let taker_id = taker.id;
        core.orders.insert(taker_id, taker);

        for trade in &outcome.trades {
            if let Err(fault) = self.settle_trade(core, spec, trade, now) {
                self.halt(shard, &fault);
                return Err(RejectReason::SymbolHalted);
            }
            core.trade_log.push(trade.clone());
            core.tape.push(trade);
            self.stats.record_trades(1);
        }

        // Maker bookkeeping: mirror fills, replenish icebergs, finish
        // completed orders.
        for fill in &outcome.maker_fills {
            let Some(maker) = core.orders.get_mut(&fill.order_id) else {
                warn!(order = %fill.order_id, "maker fill without stored order");
                continue;
            };
            maker.record_fill(fill.quantity, fill.price, now);
            let maker_done = maker.is_filled();
            let replenish = fill.done && !maker_done && maker.order_type == OrderType::Iceberg;
            if replenish {
                let price = maker.price.expect("iceberg rests with a price");
                let next = maker
                    .display_size
                    .expect("iceberg has a display size")
                    .min(maker.remaining());
                let (owner, side) = (maker.owner, maker.side);
                core.engine
                    .book_mut()
                    .rest(fill.order_id, owner, side, price, next);
            }
            if maker_done {
                if let Err(fault) = self.release_reservation(core, &fill.order_id) {
                    self.halt(shard, &fault);
                    return Err(RejectReason::SymbolHalted);
                }
            }
            self.propagate_fill(shard, core, fill.order_id, now);
        }

        for stp in &outcome.stp_cancels {
            self.cancel_internal(
                shard,
                core,
                stp.order_id,
                Disposition::Cancel(CancelReason::SelfTrade),
                true,
                now,
            );
        }

        // Taker disposition.
        let (taker_terminal, taker_has_fills, taker_tif) = {
            let taker = core.orders.get(&taker_id).expect("taker stored");
            (taker.is_terminal(), !taker.filled.is_zero(), taker.time_in_force)
        };
        if outcome.residual == Residual::Rested {
            if let TimeInForce::Gtd(at) = taker_tif {
                core.expiry.insert(at, taker_id);
            }
        }
        if taker_terminal {
            if let Err(fault) = self.release_reservation(core, &taker_id) {
                self.halt(shard, &fault);
                return Err(RejectReason::SymbolHalted);
            }
        }
        if taker_has_fills {
            self.propagate_fill(shard, core, taker_id, now);
        }

        // New last-trade price: run the trigger sweep inside the same
        // critical section.
        if !outcome.trades.is_empty() {
            if let Some(last) = core.engine.book().last_trade() {
                self.sweep_triggers(shard, core, WorkingPrice::Last, last, now);
            }
        }
        Ok(taker_id)
    }

    // ── Triggered shells (stop / stop-limit / trailing) ─────────────────

    fn admit_shell(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        mut order: Order,
        now: i64,
    ) -> Result<OrderId, RejectReason> {
        let reference = self.reference_price(core, &shard.spec, order.working_price, now);

        if order.order_type == OrderType::TrailingStop && order.stop_price.is_none() {
            let reference = reference.ok_or(RejectReason::StaleOracle {
                symbol: shard.spec.market.to_string(),
            })?;
            let distance = order
                .trail
                .expect("validated trailing stop")
                .distance(reference);
            let stop = match order.side {
                Side::Sell => reference
                    .checked_sub(distance)
                    .ok_or_else(|| RejectReason::InvalidOrder {
                        detail: "trail wider than the reference price".into(),
                    })?,
                Side::Buy => reference + distance,
            };
            order.stop_price = Some(stop);
        }

        let id = order.id;
        core.triggers.insert(TriggerState {
            order_id: id,
            side: order.side,
            working: order.working_price,
            stop: order.stop_price.expect("shell carries a stop"),
            trail: order.trail,
        });
        core.orders.insert(id, order);

        // A stop already beyond its trigger fires deterministically at
        // admission.
        if let Some(reference) = reference {
            let working = core
                .orders
                .get(&id)
                .map(|o| o.working_price)
                .expect("stored shell");
            self.sweep_triggers(shard, core, working, reference, now);
        }
        Ok(id)
    }

    /// Arm every shell whose stop the reference crossed, and admit the
    /// resulting market/limit orders. Never fails: a shell that cannot be
    /// funded is rejected in place.
    fn sweep_triggers(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        source: WorkingPrice,
        mut reference: Price,
        now: i64,
    ) {
        loop {
            let armed = core.triggers.on_reference(source, reference);
            if armed.is_empty() {
                return;
            }
            for shell in armed {
                let Some(stored) = core.orders.get(&shell.order_id) else {
                    continue;
                };
                if stored.is_terminal() {
                    continue;
                }
                let mut working = stored.clone();
                working.stop_price = Some(shell.stop);
                working.open(now);
                match self.admit_working(shard, core, working, false, now) {
                    Ok(_) => {}
                    Err(reason) => {
                        if let Some(order) = core.orders.get_mut(&shell.order_id) {
                            if !order.is_terminal() {
                                order.reject(reason.clone(), now);
                            }
                        }
                        warn!(order = %shell.order_id, code = reason.code(), "triggered shell rejected");
                    }
                }
            }
            // Arming may have traded and moved the reference; keep sweeping
            // until this source is quiescent.
            let next = match source {
                WorkingPrice::Last => core.engine.book().last_trade(),
                WorkingPrice::Mark => self.risk.mark(&shard.spec.market),
            };
            match next {
                Some(next) if next != reference => reference = next,
                _ => return,
            }
        }
    }

    fn reference_price(
        &self,
        core: &SymbolCore,
        spec: &SymbolSpec,
        working: WorkingPrice,
        now: i64,
    ) -> Option<Price> {
        match working {
            WorkingPrice::Last => core.engine.book().last_trade(),
            WorkingPrice::Mark => {
                if self
                    .risk
                    .oracle
                    .is_stale(&spec.market, now, spec.oracle_freshness_secs)
                {
                    None
                } else {
                    self.risk.mark(&spec.market)
                }
            }
        }
    }

    // ── Reservations & settlement ────────────────────────────────────────

    fn reserve_for(
        &self,
        core: &mut SymbolCore,
        spec: &SymbolSpec,
        order: &Order,
    ) -> Result<(), RejectReason> {
        let owner = order.owner;
        let quantity = order.remaining();

        if spec.is_perpetual() {
            let reference = order
                .price
                .or_else(|| self.risk.mark(&spec.market))
                .or_else(|| core.engine.book().last_trade())
                .ok_or(RejectReason::StaleOracle {
                    symbol: spec.market.to_string(),
                })?;
            let wallet = self.ledger.wallet(owner, spec.market.quote());
            let margin = self.risk.check_perp_admission(
                spec,
                owner,
                order.side,
                quantity,
                reference,
                order.leverage,
                wallet,
                order.reduce_only,
            )?;
            if !margin.is_zero() {
                self.risk.reserve_order_margin(owner, margin);
                core.reservations.insert(
                    order.id,
                    Reservation::Margin {
                        owner,
                        per_unit: margin / quantity.as_decimal(),
                        remaining: margin,
                    },
                );
            }
            return Ok(());
        }

        match order.side {
            Side::Buy => {
                let quote = spec.market.quote();
                let amount = match order.price {
                    Some(price) => quantity.notional(price),
                    // Market buy: bound by the cost of sweeping the book.
                    None => core.engine.book().sweep_quote_cost(quantity, None),
                };
                self.ledger.reserve(owner, quote, amount)?;
                core.reservations.insert(
                    order.id,
                    Reservation::Spot {
                        owner,
                        asset: quote.to_string(),
                        remaining: amount,
                    },
                );
            }
            Side::Sell => {
                let base = spec.market.base();
                self.ledger.reserve(owner, base, quantity.as_decimal())?;
                core.reservations.insert(
                    order.id,
                    Reservation::Spot {
                        owner,
                        asset: base.to_string(),
                        remaining: quantity.as_decimal(),
                    },
                );
            }
        }
        Ok(())
    }

    fn settle_trade(
        &self,
        core: &mut SymbolCore,
        spec: &SymbolSpec,
        trade: &Trade,
        now: i64,
    ) -> Result<(), EngineFault> {
        if spec.is_perpetual() {
            return self.settle_perp_trade(core, spec, trade, now);
        }

        let buyer = trade.buyer();
        let seller = trade.seller();
        let quantity = trade.quantity.as_decimal();
        let notional = trade.notional();
        // Fee assets follow what each side receives: buyer pays in base,
        // seller in quote.
        let (buyer_fee, seller_fee) = match trade.maker_side {
            Side::Buy => (trade.maker_fee, trade.taker_fee),
            Side::Sell => (trade.taker_fee, trade.maker_fee),
        };

        self.consume_spot(core, &trade.buy_order_id(), notional)?;
        self.consume_spot(core, &trade.sell_order_id(), quantity)?;
        self.ledger.settle_spot(
            buyer,
            seller,
            spec.market.base(),
            spec.market.quote(),
            quantity,
            notional,
            buyer_fee,
            seller_fee,
        )
    }

    fn settle_perp_trade(
        &self,
        core: &mut SymbolCore,
        spec: &SymbolSpec,
        trade: &Trade,
        now: i64,
    ) -> Result<(), EngineFault> {
        let quote = spec.market.quote();
        let legs = [
            (trade.buyer(), Side::Buy, trade.buy_order_id()),
            (trade.seller(), Side::Sell, trade.sell_order_id()),
        ];
        for (owner, side, order_id) in legs {
            let (leverage, margin_mode) = core
                .orders
                .get(&order_id)
                .map(|o| (o.leverage, o.margin_mode))
                .unwrap_or((1, types::position::MarginMode::Isolated));
            let (_, realized) = self.risk.positions.apply_fill(
                owner,
                &spec.market,
                side,
                trade.quantity,
                trade.price,
                leverage,
                margin_mode,
                now,
            );
            if realized > Decimal::ZERO {
                self.ledger.credit(owner, quote, realized);
            } else if realized < Decimal::ZERO {
                let shortfall = self.ledger.debit_up_to(owner, quote, -realized);
                if !shortfall.is_zero() {
                    warn!(%owner, %shortfall, "realized loss exceeds wallet, drawing insurance");
                    self.risk.insurance_draw(quote, shortfall);
                }
            }
            self.consume_margin(core, &order_id, trade.quantity);
        }

        // Perpetual fees settle in quote on both sides.
        for (owner, fee) in [
            (trade.maker_owner, trade.maker_fee),
            (trade.taker_owner, trade.taker_fee),
        ] {
            if fee > Decimal::ZERO {
                let covered = fee - self.ledger.debit_up_to(owner, quote, fee);
                self.ledger.collect_fee(quote, covered);
            } else if fee < Decimal::ZERO {
                // Maker rebate.
                self.ledger.credit(owner, quote, -fee);
                self.ledger.collect_fee(quote, fee);
            }
        }
        Ok(())
    }

    fn consume_spot(
        &self,
        core: &mut SymbolCore,
        order_id: &OrderId,
        amount: Decimal,
    ) -> Result<(), EngineFault> {
        match core.reservations.get_mut(order_id) {
            Some(Reservation::Spot { asset, remaining, owner }) => {
                if *remaining < amount {
                    return Err(EngineFault::LedgerDrift {
                        asset: asset.clone(),
                        delta: amount - *remaining,
                    });
                }
                let _ = owner;
                *remaining -= amount;
                Ok(())
            }
            _ => Err(EngineFault::LedgerDrift {
                asset: "?".into(),
                delta: amount,
            }),
        }
    }

    fn consume_margin(&self, core: &mut SymbolCore, order_id: &OrderId, quantity: Quantity) {
        if let Some(Reservation::Margin { owner, per_unit, remaining }) =
            core.reservations.get_mut(order_id)
        {
            let consumed = (*per_unit * quantity.as_decimal()).min(*remaining);
            *remaining -= consumed;
            self.risk.release_order_margin(*owner, consumed);
        }
    }

    /// Give back whatever an order still holds, on any terminal path.
    fn release_reservation(
        &self,
        core: &mut SymbolCore,
        order_id: &OrderId,
    ) -> Result<(), EngineFault> {
        match core.reservations.remove(order_id) {
            Some(Reservation::Spot { owner, asset, remaining }) => {
                self.ledger.release(owner, &asset, remaining)
            }
            Some(Reservation::Margin { owner, remaining, .. }) => {
                self.risk.release_order_margin(owner, remaining);
                Ok(())
            }
            None => Ok(()),
        }
    }

    // ── Linked-order propagation ─────────────────────────────────────────

    /// Called after an order gains fills (partial or full).
    fn propagate_fill(&self, shard: &SymbolShard, core: &mut SymbolCore, id: OrderId, now: i64) {
        // OCO: any fill cancels the sibling.
        if let Some(sibling) = core.links.unlink_oco(&id) {
            self.cancel_internal(
                shard,
                core,
                sibling,
                Disposition::Cancel(CancelReason::LinkedOrder),
                false,
                now,
            );
        }
        // A filling bracket child cancels the other child and closes out
        // the bracket.
        if let Some(parent) = core.links.parent_of(&id) {
            if let Some(children) = core.links.children_of(&parent) {
                if let Some(sibling) = children.sibling_of(&id) {
                    self.cancel_internal(
                        shard,
                        core,
                        sibling,
                        Disposition::Cancel(CancelReason::LinkedOrder),
                        false,
                        now,
                    );
                }
                core.links.remove_bracket(&parent);
            }
        }
        // A filling bracket parent spawns or resizes its children.
        if core.links.has_pending_bracket(&id) || core.links.children_of(&id).is_some() {
            self.sync_bracket_children(shard, core, id, now);
        }
    }

    fn sync_bracket_children(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        parent_id: OrderId,
        now: i64,
    ) {
        let Some(parent) = core.orders.get(&parent_id).cloned() else {
            return;
        };
        if parent.filled.is_zero() {
            return;
        }

        if let Some(children) = core.links.children_of(&parent_id) {
            self.resize_bracket_children(shard, core, &parent, children, now);
            return;
        }
        let Some(bracket) = core.links.take_pending_bracket(&parent_id) else {
            return;
        };

        let close_side = parent.side.opposite();
        let perp = shard.spec.is_perpetual();

        let mut take_profit = Order::new(
            parent.owner,
            shard.spec.market.clone(),
            close_side,
            OrderType::Limit,
            TimeInForce::Gtc,
            Some(Price::new(bracket.take_profit)),
            parent.filled,
            now,
        );
        take_profit.parent_id = Some(parent_id);
        take_profit.reduce_only = perp;
        take_profit.leverage = parent.leverage;
        take_profit.margin_mode = parent.margin_mode;

        let mut stop_loss = Order::new(
            parent.owner,
            shard.spec.market.clone(),
            close_side,
            OrderType::Stop,
            TimeInForce::Gtc,
            None,
            parent.filled,
            now,
        );
        stop_loss.stop_price = Some(Price::new(bracket.stop_loss));
        stop_loss.parent_id = Some(parent_id);
        stop_loss.reduce_only = perp;
        stop_loss.leverage = parent.leverage;
        stop_loss.margin_mode = parent.margin_mode;

        let children = BracketChildren {
            stop_loss: stop_loss.id,
            take_profit: take_profit.id,
        };
        if let Some(parent_mut) = core.orders.get_mut(&parent_id) {
            parent_mut.child_ids = vec![children.stop_loss, children.take_profit];
        }
        core.links.register_children(parent_id, children);
        self.order_index
            .insert(children.take_profit, shard.spec.market.clone());
        self.order_index
            .insert(children.stop_loss, shard.spec.market.clone());

        if let Err(reason) = self.admit_working(shard, core, take_profit, false, now) {
            warn!(parent = %parent_id, code = reason.code(), "take-profit child rejected");
        }
        if let Err(reason) = self.admit_shell(shard, core, stop_loss, now) {
            warn!(parent = %parent_id, code = reason.code(), "stop-loss child rejected");
        }
    }

    /// Children track the parent's filled quantity.
    fn resize_bracket_children(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        parent: &Order,
        children: BracketChildren,
        now: i64,
    ) {
        let target = parent.filled;
        for child_id in [children.take_profit, children.stop_loss] {
            let Some(child) = core.orders.get(&child_id).cloned() else {
                continue;
            };
            if child.is_terminal() || !child.filled.is_zero() || child.quantity == target {
                continue;
            }
            let grow = target
                .checked_sub(child.quantity)
                .unwrap_or(Quantity::zero());
            if grow.is_zero() {
                continue;
            }

            if child.order_type == OrderType::Stop {
                // Trigger shells only need the new size recorded.
                if let Some(child) = core.orders.get_mut(&child_id) {
                    child.quantity = target;
                    child.updated_at = now;
                }
                continue;
            }

            // Resting limit child: extend reservation, then cancel and
            // re-rest at the same price with the new size.
            let price = child.price.expect("limit child has a price");
            if !shard.spec.is_perpetual() {
                let (asset, extra) = match child.side {
                    Side::Buy => (shard.spec.market.quote(), grow.notional(price)),
                    Side::Sell => (shard.spec.market.base(), grow.as_decimal()),
                };
                if self.ledger.reserve(child.owner, asset, extra).is_err() {
                    warn!(child = %child_id, "cannot fund bracket child resize");
                    continue;
                }
                if let Some(Reservation::Spot { remaining, .. }) =
                    core.reservations.get_mut(&child_id)
                {
                    *remaining += extra;
                }
            }
            core.engine.cancel(&child_id);
            core.engine
                .book_mut()
                .rest(child_id, child.owner, child.side, price, target);
            if let Some(child) = core.orders.get_mut(&child_id) {
                child.quantity = target;
                child.updated_at = now;
            }
        }
    }

    fn propagate_cancel(&self, shard: &SymbolShard, core: &mut SymbolCore, id: OrderId, now: i64) {
        if let Some(sibling) = core.links.unlink_oco(&id) {
            self.cancel_internal(
                shard,
                core,
                sibling,
                Disposition::Cancel(CancelReason::LinkedOrder),
                false,
                now,
            );
        }
        // Parent cancelled: take both children down.
        if let Some(children) = core.links.remove_bracket(&id) {
            for child in [children.stop_loss, children.take_profit] {
                self.cancel_internal(
                    shard,
                    core,
                    child,
                    Disposition::Cancel(CancelReason::LinkedOrder),
                    false,
                    now,
                );
            }
        }
        // Child cancelled: the sibling goes too.
        if let Some(parent) = core.links.parent_of(&id) {
            if let Some(children) = core.links.children_of(&parent) {
                if let Some(sibling) = children.sibling_of(&id) {
                    self.cancel_internal(
                        shard,
                        core,
                        sibling,
                        Disposition::Cancel(CancelReason::LinkedOrder),
                        false,
                        now,
                    );
                }
                core.links.remove_bracket(&parent);
            }
        }
    }

    // ── Cancel / amend ───────────────────────────────────────────────────

    pub fn cancel(&self, order_id: &OrderId, owner: AccountId) -> Result<(), CancelError> {
        self.cancel_at(order_id, owner, unix_now_ns())
    }

    pub fn cancel_at(&self, order_id: &OrderId, owner: AccountId, now: i64) -> Result<(), CancelError> {
        let symbol = self
            .order_index
            .get(order_id)
            .map(|s| s.clone())
            .ok_or(CancelError::NotFound)?;
        let shard = self
            .symbols
            .get(&symbol)
            .map(|s| s.clone())
            .ok_or(CancelError::NotFound)?;
        let mut core = self.lock_core(&shard, now);

        let order = core.orders.get(order_id).ok_or(CancelError::NotFound)?;
        if order.owner != owner {
            return Err(CancelError::NotOwned);
        }
        if order.is_terminal() {
            return Err(CancelError::Terminal);
        }

        let before = capture_levels(core.engine.book());
        self.cancel_internal(
            &shard,
            &mut core,
            *order_id,
            Disposition::Cancel(CancelReason::UserRequested),
            true,
            now,
        );
        self.emit_deltas(&mut core, before, now);
        Ok(())
    }

    fn cancel_internal(
        &self,
        shard: &SymbolShard,
        core: &mut SymbolCore,
        id: OrderId,
        disposition: Disposition,
        propagate: bool,
        now: i64,
    ) {
        let Some(order) = core.orders.get_mut(&id) else {
            return;
        };
        if order.is_terminal() {
            return;
        }
        if let TimeInForce::Gtd(at) = order.time_in_force {
            core.expiry.remove(at, &id);
        }
        match disposition {
            Disposition::Cancel(reason) => order.cancel(reason, now),
            Disposition::Expire => order.expire(now),
        }
        core.triggers.remove(&id);
        core.engine.cancel(&id);
        if let Err(fault) = self.release_reservation(core, &id) {
            self.halt(shard, &fault);
            return;
        }
        if propagate {
            self.propagate_cancel(shard, core, id, now);
        }
    }

    /// Amend price and/or quantity. Implemented as cancel + re-admit: the
    /// order keeps its id and fill history but loses time priority.
    pub fn amend_at(
        &self,
        order_id: &OrderId,
        owner: AccountId,
        new_price: Option<Decimal>,
        new_quantity: Option<Decimal>,
        now: i64,
    ) -> Result<OrderId, EngineError> {
        let symbol = self
            .order_index
            .get(order_id)
            .map(|s| s.clone())
            .ok_or(CancelError::NotFound)?;
        let shard = self
            .symbols
            .get(&symbol)
            .map(|s| s.clone())
            .ok_or(CancelError::NotFound)?;
        if shard.halted.load(Ordering::Acquire) {
            return Err(RejectReason::SymbolHalted.into());
        }
        let mut core = self.lock_core(&shard, now);

        let order = core.orders.get(order_id).ok_or(CancelError::NotFound)?;
        if order.owner != owner {
            return Err(CancelError::NotOwned.into());
        }
        if order.is_terminal() {
            return Err(CancelError::Terminal.into());
        }
        if order.order_type != OrderType::Limit {
            return Err(RejectReason::InvalidOrder {
                detail: "only resting limit orders can be amended".into(),
            }
            .into());
        }
        let original = order.clone();

        let price = match new_price {
            Some(raw) => shard.spec.validate_price(raw).map_err(EngineError::from)?,
            None => original.price.expect("limit order has a price"),
        };
        let quantity = match new_quantity {
            Some(raw) => shard.spec.validate_quantity(raw).map_err(EngineError::from)?,
            None => original.quantity,
        };
        if quantity.as_decimal() <= original.filled.as_decimal() {
            return Err(RejectReason::InvalidOrder {
                detail: "amended quantity at or below filled quantity".into(),
            }
            .into());
        }

        let before = capture_levels(core.engine.book());
        // No link propagation: the replacement inherits the linkage.
        self.cancel_internal(
            &shard,
            &mut core,
            *order_id,
            Disposition::Cancel(CancelReason::Amended),
            false,
            now,
        );

        let mut replacement = Order::new(
            owner,
            shard.spec.market.clone(),
            original.side,
            OrderType::Limit,
            original.time_in_force,
            Some(price),
            quantity,
            now,
        );
        replacement.id = original.id;
        replacement.client_id = original.client_id.clone();
        replacement.filled = original.filled;
        replacement.avg_fill_price = original.avg_fill_price;
        replacement.leverage = original.leverage;
        replacement.margin_mode = original.margin_mode;
        replacement.created_at = original.created_at;
        if !replacement.filled.is_zero() {
            replacement.status = types::order::OrderStatus::PartiallyFilled;
        }

        let result = self
            .admit_working(&shard, &mut core, replacement, false, now)
            .map_err(EngineError::from);
        self.emit_deltas(&mut core, before, now);
        result
    }

    // ── Views ────────────────────────────────────────────────────────────

    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        let symbol = self.order_index.get(order_id)?.clone();
        let shard = self.symbols.get(&symbol)?.clone();
        let core = shard.core.lock().expect("symbol core poisoned");
        core.orders.get(order_id).cloned()
    }

    pub fn snapshot_book(&self, symbol: &MarketId, depth: usize, now: i64) -> Option<DepthSnapshot> {
        let shard = self.symbols.get(symbol)?.clone();
        let mut core = shard.core.lock().expect("symbol core poisoned");
        let sequence = core.seq.next();
        Some(DepthSnapshot::capture(
            core.engine.book(),
            depth,
            sequence,
            now / 1_000,
        ))
    }

    pub fn market_stats(&self, symbol: &MarketId, now: i64) -> Option<MarketStats> {
        let shard = self.symbols.get(symbol)?.clone();
        let mut core = shard.core.lock().expect("symbol core poisoned");
        let volume_24h = core.engine.book_mut().volume_24h(now);
        let book = core.engine.book();
        Some(MarketStats {
            symbol: symbol.to_string(),
            last_price: book.last_trade(),
            best_bid: book.best_bid().map(|(p, _)| p),
            best_ask: book.best_ask().map(|(p, _)| p),
            spread: book.spread(),
            session_volume: book.session_volume(),
            volume_24h,
            timestamp: now,
        })
    }

    pub fn account(&self, owner: AccountId) -> AccountBalances {
        self.ledger.balances(owner)
    }

    pub fn positions(&self, owner: AccountId) -> Vec<Position> {
        self.risk.positions.positions(owner)
    }

    pub fn margin_account(
        &self,
        owner: AccountId,
        symbol: &MarketId,
    ) -> Option<risk_engine::engine::MarginAccountView> {
        let spec = self.spec(symbol)?;
        let wallet = self.ledger.wallet(owner, spec.market.quote());
        Some(self.risk.margin_account(owner, wallet))
    }

    pub fn recent_trades(&self, symbol: &MarketId, limit: usize) -> Vec<market_data::TradeRecord> {
        let Some(shard) = self.symbols.get(symbol).map(|s| s.clone()) else {
            return Vec::new();
        };
        let core = shard.core.lock().expect("symbol core poisoned");
        core.tape.recent(limit)
    }

    /// The authoritative per-symbol trade log, in emission order.
    pub fn trade_log(&self, symbol: &MarketId) -> Vec<Trade> {
        let Some(shard) = self.symbols.get(symbol).map(|s| s.clone()) else {
            return Vec::new();
        };
        let core = shard.core.lock().expect("symbol core poisoned");
        core.trade_log.clone()
    }

    /// Drain pending incremental book deltas for publication.
    pub fn drain_deltas(&self, symbol: &MarketId) -> Vec<BookDelta> {
        let Some(shard) = self.symbols.get(symbol).map(|s| s.clone()) else {
            return Vec::new();
        };
        let mut core = shard.core.lock().expect("symbol core poisoned");
        std::mem::take(&mut core.deltas)
    }

    /// Dispatch one ingress envelope; the response echoes the correlation
    /// id.
    pub fn handle(&self, request: crate::protocol::Request) -> crate::protocol::Response {
        use crate::protocol::{RequestBody, Response, ResponseBody};
        let correlation_id = request.correlation_id;
        match request.body {
            RequestBody::Submit(order) => match self.submit(*order) {
                Ok(order_id) => Response::accepted(correlation_id, order_id),
                Err(reason) => Response::rejected(correlation_id, &reason),
            },
            RequestBody::Cancel { order_id, owner } => match self.cancel(&order_id, owner) {
                Ok(()) => Response {
                    correlation_id,
                    body: ResponseBody::Cancelled,
                },
                Err(error) => Response::cancel_failed(correlation_id, error),
            },
            RequestBody::Amend {
                order_id,
                owner,
                new_price,
                new_quantity,
            } => match self.amend_at(&order_id, owner, new_price, new_quantity, unix_now_ns()) {
                Ok(order_id) => Response::accepted(correlation_id, order_id),
                Err(EngineError::Rejected(reason)) => Response::rejected(correlation_id, &reason),
                Err(EngineError::Cancel(error)) => Response::cancel_failed(correlation_id, error),
                Err(EngineError::Fault(_)) => {
                    Response::rejected(correlation_id, &RejectReason::SymbolHalted)
                }
            },
            RequestBody::Subscribe { symbol, stream } => Response {
                correlation_id,
                body: ResponseBody::Subscribed { symbol, stream },
            },
            RequestBody::Snapshot { symbol, depth } => {
                match self.snapshot_book(&symbol, depth, unix_now_ns()) {
                    Some(snapshot) => Response {
                        correlation_id,
                        body: ResponseBody::Snapshot(snapshot),
                    },
                    None => Response::rejected(
                        correlation_id,
                        &RejectReason::UnknownSymbol {
                            symbol: symbol.to_string(),
                        },
                    ),
                }
            }
        }
    }

    pub fn health(&self, now: i64) -> serde_json::Value {
        self.stats.health(now)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_halted(&self, symbol: &MarketId) -> bool {
        self.symbols
            .get(symbol)
            .map(|s| s.halted.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn liquidation_records(&self) -> Vec<Liquidation> {
        self.liquidations.lock().expect("liquidations poisoned").clone()
    }

    // ── Background-task entry points ─────────────────────────────────────

    /// A new mark price: sweep mark-working triggers.
    pub fn on_mark_update(&self, symbol: &MarketId, mark: Price, now: i64) {
        let Some(shard) = self.symbols.get(symbol).map(|s| s.clone()) else {
            return;
        };
        if shard.halted.load(Ordering::Acquire) {
            return;
        }
        let mut core = self.lock_core(&shard, now);
        let before = capture_levels(core.engine.book());
        self.sweep_triggers(&shard, &mut core, WorkingPrice::Mark, mark, now);
        self.emit_deltas(&mut core, before, now);
    }

    /// Periodic GTD sweep, independent of admissions.
    pub fn sweep_expiries(&self, symbol: &MarketId, now: i64) {
        if let Some(shard) = self.symbols.get(symbol).map(|s| s.clone()) {
            let _core = self.lock_core(&shard, now);
        }
    }

    /// Apply funding transfers against wallets. Payer shortfalls draw the
    /// insurance fund so receivers are always made whole.
    pub fn apply_funding_transfers(
        &self,
        spec: &SymbolSpec,
        transfers: &[risk_engine::engine::FundingTransfer],
    ) {
        let quote = spec.market.quote();
        for transfer in transfers {
            if transfer.payment > Decimal::ZERO {
                let shortfall = self
                    .ledger
                    .debit_up_to(transfer.owner, quote, transfer.payment);
                if !shortfall.is_zero() {
                    warn!(owner = %transfer.owner, %shortfall, "funding shortfall drawn from insurance");
                    self.risk.insurance_draw(quote, shortfall);
                }
            } else if transfer.payment < Decimal::ZERO {
                self.ledger.credit(transfer.owner, quote, -transfer.payment);
            }
        }
    }

    /// Drain one liquidation request: synthesise the forced reduce-only
    /// market order and submit it through the normal matching path (band
    /// protection included, balance checks bypassed). Returns a retry with
    /// its back-off delay when the band aborted part of the close.
    pub fn process_liquidation(
        &self,
        request: LiquidationRequest,
        now: i64,
    ) -> Option<(LiquidationRequest, Duration)> {
        let shard = self.symbols.get(&request.symbol).map(|s| s.clone())?;
        if shard.halted.load(Ordering::Acquire) {
            return None;
        }
        let spec = shard.spec.clone();
        let quote = spec.market.quote();
        let mmr = spec.maintenance_margin_rate();

        let mut core = self.lock_core(&shard, now);

        // The position may have closed or shrunk since enqueue.
        let Some((direction, size)) = self.risk.positions.open_size(request.owner, &spec.market)
        else {
            return None;
        };
        let close_side = match direction {
            types::position::Direction::Long => Side::Sell,
            _ => Side::Buy,
        };
        let position = self.risk.positions.get(request.owner, &spec.market)?;

        let mut forced = Order::new(
            request.owner,
            spec.market.clone(),
            close_side,
            OrderType::Market,
            TimeInForce::Ioc,
            None,
            size,
            now,
        );
        forced.reduce_only = true;
        forced.leverage = position.leverage;
        forced.margin_mode = position.margin_mode;
        let forced_id = forced.id;

        match self.admit_working(&shard, &mut core, forced, true, now) {
            Ok(_) => {}
            Err(reason) => {
                warn!(owner = %request.owner, code = reason.code(), "forced close rejected");
                return None;
            }
        }
        self.order_index.insert(forced_id, spec.market.clone());

        let closed = core
            .orders
            .get(&forced_id)
            .map(|o| (o.filled, o.avg_fill_price))
            .unwrap_or((Quantity::zero(), None));
        drop(core);

        let (filled, avg_price) = closed;
        let filled_notional = avg_price
            .map(|p| filled.notional(p))
            .unwrap_or(Decimal::ZERO);

        // Liquidation fee on what actually closed, paid into insurance.
        let fee = if filled_notional.is_zero() {
            Decimal::ZERO
        } else {
            liquidation::liquidation_fee(filled_notional, request.margin_ratio, mmr)
        };
        if !fee.is_zero() {
            let shortfall = self.ledger.debit_up_to(request.owner, quote, fee);
            self.risk.insurance_contribute(quote, fee - shortfall);
        }

        let remaining = size.checked_sub(filled).unwrap_or(Quantity::zero());
        if remaining.is_zero() {
            self.record_liquidation(Liquidation::new(
                request.owner,
                spec.market.clone(),
                close_side,
                filled,
                avg_price,
                request.margin_ratio,
                fee,
                Decimal::ZERO,
                now,
            ));
            return None;
        }

        if request.attempt + 1 >= MAX_ATTEMPTS {
            // Cannot complete at the band: the open deficit becomes
            // insurance-fund loss.
            let wallet = self.ledger.wallet(request.owner, quote);
            let residual = self
                .risk
                .positions
                .get(request.owner, &spec.market)
                .map(|p| p.unrealized_pnl)
                .unwrap_or(Decimal::ZERO);
            let deficit = (wallet + residual).min(Decimal::ZERO).abs();
            if !deficit.is_zero() {
                self.risk.insurance_draw(quote, deficit);
            }
            error!(owner = %request.owner, symbol = %spec.market, %deficit, "liquidation abandoned at band");
            self.record_liquidation(Liquidation::new(
                request.owner,
                spec.market.clone(),
                close_side,
                filled,
                avg_price,
                request.margin_ratio,
                fee,
                deficit,
                now,
            ));
            return None;
        }

        let retry = LiquidationRequest {
            attempt: request.attempt + 1,
            size: remaining,
            enqueued_at: now,
            ..request
        };
        let delay = backoff_delay(retry.attempt);
        Some((retry, delay))
    }

    fn record_liquidation(&self, record: Liquidation) {
        self.liquidations
            .lock()
            .expect("liquidations poisoned")
            .push(record);
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn effective_band(&self, spec: &SymbolSpec) -> Option<Decimal> {
        match (spec.price_band, self.config.default_max_slippage) {
            (Some(band), Some(slippage)) => Some(band.min(slippage)),
            (band, slippage) => band.or(slippage),
        }
    }

    fn emit_deltas(&self, core: &mut SymbolCore, before: market_data::LevelMap, now: i64) {
        let after = capture_levels(core.engine.book());
        if before == after {
            return;
        }
        let sequence = core.seq.next();
        let deltas = diff_levels(&before, &after, sequence, now / 1_000);
        core.deltas.extend(deltas);
    }

    fn halt(&self, shard: &SymbolShard, fault: &EngineFault) {
        shard.halted.store(true, Ordering::Release);
        error!(symbol = %shard.spec.market, %fault, "symbol halted on invariant violation");
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

