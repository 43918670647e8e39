//! End-to-end exchange scenarios through the facade.
//!
//! Tick 0.01, lot 0.001, zero fees unless a test says otherwise. All
//! timestamps are explicit so every run is reproducible.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trading_engine::{EngineConfig, Exchange};
use types::errors::{CancelError, RejectReason};
use types::fee::FeeSchedule;
use types::ids::{AccountId, MarketId};
use types::order::{
    OrderRequest, OrderStatus, OrderType, Side, TimeInForce, TrailBy,
};
use types::symbol::SymbolSpec;

const TS: i64 = 1_718_000_000_000_000_000;
const SEC: i64 = 1_000_000_000;

fn market() -> MarketId {
    MarketId::new("BTC/USDT")
}

fn spot_exchange() -> Exchange {
    let exchange = Exchange::new(EngineConfig::default());
    let mut spec = SymbolSpec::spot(market(), dec!(0.01), dec!(0.001));
    spec.fees = FeeSchedule::free();
    exchange.list_symbol(spec, TS);
    exchange
}

fn perp_exchange() -> Exchange {
    let exchange = Exchange::new(EngineConfig::default());
    let mut spec = SymbolSpec::perpetual(market(), dec!(0.01), dec!(0.001), 125, dec!(0.008), dec!(0.005));
    spec.fees = FeeSchedule::free();
    exchange.list_symbol(spec, TS);
    exchange
}

fn trader(exchange: &Exchange, usdt: Decimal, btc: Decimal) -> AccountId {
    let owner = AccountId::new();
    if !usdt.is_zero() {
        exchange.deposit(owner, "USDT", usdt);
    }
    if !btc.is_zero() {
        exchange.deposit(owner, "BTC", btc);
    }
    owner
}

fn limit(owner: AccountId, side: Side, price: Decimal, qty: Decimal) -> OrderRequest {
    OrderRequest::limit(owner, market(), side, price, qty)
}

fn market_order(owner: AccountId, side: Side, qty: Decimal) -> OrderRequest {
    OrderRequest::market(owner, market(), side, qty)
}

/// Print a last-trade reference at `price` using two throwaway accounts.
fn print_reference(exchange: &Exchange, price: Decimal, now: i64) {
    let seller = trader(exchange, dec!(0), dec!(1));
    let buyer = trader(exchange, dec!(1_000_000), dec!(0));
    exchange
        .submit_at(limit(seller, Side::Sell, price, dec!(0.001)), now)
        .unwrap();
    exchange
        .submit_at(limit(buyer, Side::Buy, price, dec!(0.001)), now + 1)
        .unwrap();
}

// ── Scenario 1: exact cross ──────────────────────────────────────────────

#[test]
fn full_cross_empties_the_book() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(1));
    let buyer = trader(&exchange, dec!(100), dec!(0));

    let sell_id = exchange
        .submit_at(limit(seller, Side::Sell, dec!(100.00), dec!(1.0)), TS)
        .unwrap();
    let buy_id = exchange
        .submit_at(limit(buyer, Side::Buy, dec!(100.00), dec!(1.0)), TS + 1)
        .unwrap();

    let log = exchange.trade_log(&market());
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].price, "100.00".parse().unwrap());
    assert_eq!(log[0].quantity, "1.0".parse().unwrap());

    assert_eq!(exchange.order(&sell_id).unwrap().status, OrderStatus::Filled);
    assert_eq!(exchange.order(&buy_id).unwrap().status, OrderStatus::Filled);

    let stats = exchange.market_stats(&market(), TS + 2).unwrap();
    assert_eq!(stats.best_bid, None);
    assert_eq!(stats.best_ask, None);
    assert_eq!(stats.last_price, Some("100.00".parse().unwrap()));

    // Settlement: buyer holds the base, seller the quote.
    assert_eq!(exchange.account(buyer).free("BTC"), dec!(1.0));
    assert_eq!(exchange.account(buyer).free("USDT"), dec!(0));
    assert_eq!(exchange.account(seller).free("USDT"), dec!(100));
}

// ── Scenario 2: partial market fill ──────────────────────────────────────

#[test]
fn market_buy_leaves_maker_remainder() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(1));
    let buyer = trader(&exchange, dec!(100), dec!(0));

    let sell_id = exchange
        .submit_at(limit(seller, Side::Sell, dec!(101.00), dec!(1.0)), TS)
        .unwrap();
    let buy_id = exchange
        .submit_at(market_order(buyer, Side::Buy, dec!(0.6)), TS + 1)
        .unwrap();

    let log = exchange.trade_log(&market());
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].price, "101.00".parse().unwrap());
    assert_eq!(log[0].quantity, "0.6".parse().unwrap());

    assert!(exchange.order(&buy_id).unwrap().is_filled());
    let maker = exchange.order(&sell_id).unwrap();
    assert_eq!(maker.status, OrderStatus::PartiallyFilled);
    assert_eq!(maker.remaining(), "0.4".parse().unwrap());

    let stats = exchange.market_stats(&market(), TS + 2).unwrap();
    assert_eq!(stats.best_ask, Some("101.00".parse().unwrap()));
}

// ── Scenario 3: price-time priority across owners ────────────────────────

#[test]
fn earlier_maker_fills_first() {
    let exchange = spot_exchange();
    let a = trader(&exchange, dec!(0), dec!(2));
    let b = trader(&exchange, dec!(0), dec!(2));
    let c = trader(&exchange, dec!(1000), dec!(0));

    let a_id = exchange
        .submit_at(limit(a, Side::Sell, dec!(100.00), dec!(2.0)), TS)
        .unwrap();
    let b_id = exchange
        .submit_at(limit(b, Side::Sell, dec!(100.00), dec!(2.0)), TS + 1)
        .unwrap();
    let c_id = exchange
        .submit_at(market_order(c, Side::Buy, dec!(3.0)), TS + 2)
        .unwrap();

    let log = exchange.trade_log(&market());
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].maker_order_id, a_id);
    assert_eq!(log[0].quantity, "2.0".parse().unwrap());
    assert_eq!(log[1].maker_order_id, b_id);
    assert_eq!(log[1].quantity, "1.0".parse().unwrap());

    assert!(exchange.order(&a_id).unwrap().is_filled());
    assert_eq!(
        exchange.order(&b_id).unwrap().remaining(),
        "1.0".parse().unwrap()
    );
    assert!(exchange.order(&c_id).unwrap().is_filled());
}

// ── Scenario 4: FOK all-or-nothing ───────────────────────────────────────

#[test]
fn unfillable_fok_rejects_without_state_change() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(3));
    let buyer = trader(&exchange, dec!(1000), dec!(0));

    exchange
        .submit_at(limit(seller, Side::Sell, dec!(100.00), dec!(3.0)), TS)
        .unwrap();

    let fok = limit(buyer, Side::Buy, dec!(100.00), dec!(5.0)).with_tif(TimeInForce::Fok);
    let err = exchange.submit_at(fok, TS + 1).unwrap_err();
    assert_eq!(err, RejectReason::UnfillableFok);

    // Book untouched, balances untouched.
    assert!(exchange.trade_log(&market()).is_empty());
    let stats = exchange.market_stats(&market(), TS + 2).unwrap();
    assert_eq!(stats.best_ask, Some("100.00".parse().unwrap()));
    assert_eq!(exchange.account(buyer).free("USDT"), dec!(1000));
    assert_eq!(exchange.account(buyer).reserved("USDT"), dec!(0));
}

// ── Scenario 5: trailing stop ratchet and trigger ────────────────────────

#[test]
fn trailing_stop_tracks_peak_and_fires_on_pullback() {
    let exchange = spot_exchange();
    print_reference(&exchange, dec!(100.00), TS);

    let owner = trader(&exchange, dec!(0), dec!(1));
    let trail = OrderRequest::market(owner, market(), Side::Sell, dec!(1.0))
        .with_trail(TrailBy::Amount(dec!(2.00)));
    let shell_id = exchange.submit_at(trail, TS + 10).unwrap();

    // Initial stop = 100 − 2 = 98.
    assert_eq!(
        exchange.order(&shell_id).unwrap().stop_price,
        Some("98.00".parse().unwrap())
    );

    // Liquidity for the eventual forced sale.
    let bidder = trader(&exchange, dec!(200), dec!(0));
    exchange
        .submit_at(limit(bidder, Side::Buy, dec!(101.00), dec!(1.0)), TS + 20)
        .unwrap();

    print_reference(&exchange, dec!(105.00), TS + 30);
    assert_eq!(
        exchange.order(&shell_id).unwrap().stop_price,
        Some("103.00".parse().unwrap()),
        "stop tracks the peak"
    );
    assert_eq!(exchange.order(&shell_id).unwrap().status, OrderStatus::Pending);

    print_reference(&exchange, dec!(103.00), TS + 40);
    assert_eq!(
        exchange.order(&shell_id).unwrap().status,
        OrderStatus::Pending,
        "touching the stop from above does not fire"
    );

    print_reference(&exchange, dec!(102.00), TS + 50);
    let shell = exchange.order(&shell_id).unwrap();
    assert!(shell.is_filled(), "status {:?}", shell.status);

    // The emitted market sell crossed the 101 bid.
    let log = exchange.trade_log(&market());
    let fill = log.iter().find(|t| t.quantity == "1.0".parse().unwrap()).unwrap();
    assert_eq!(fill.price, "101.00".parse().unwrap());
    assert_eq!(fill.sell_order_id(), shell_id);
}

// ── Scenario 6: perpetual liquidation ────────────────────────────────────

#[test]
fn margin_deficient_long_is_liquidated() {
    let exchange = perp_exchange();
    let spec = exchange.spec(&market()).unwrap();

    let long = trader(&exchange, dec!(5000), dec!(0));
    let short = trader(&exchange, dec!(60000), dec!(0));

    // Open 1 BTC long at 50,000, 10x.
    exchange
        .submit_at(
            limit(short, Side::Sell, dec!(50000.00), dec!(1.0)).with_leverage(10),
            TS,
        )
        .unwrap();
    exchange
        .submit_at(
            limit(long, Side::Buy, dec!(50000.00), dec!(1.0)).with_leverage(10),
            TS + 1,
        )
        .unwrap();
    assert_eq!(exchange.positions(long).len(), 1);

    // Mark collapses to 45,225: margin ratio falls to the MMR.
    exchange
        .update_index(&market(), dec!(45225), TS + 2 * SEC)
        .unwrap();
    exchange.risk().refresh_mark(&spec, TS + 2 * SEC).unwrap();

    let ledger = exchange.ledger();
    let outcome = exchange
        .risk()
        .monitor_symbol(&spec, TS + 2 * SEC, &|owner| ledger.wallet(owner, "USDT"));
    assert_eq!(outcome.liquidations.len(), 1);
    let request = outcome.liquidations[0].clone();
    assert_eq!(request.owner, long);
    assert_eq!(request.close_side, Side::Sell);
    assert_eq!(request.size, "1.0".parse().unwrap());
    assert!(request.margin_ratio <= dec!(0.005));

    // Bid inside the 5% band absorbs the forced close.
    exchange
        .submit_at(
            limit(short, Side::Buy, dec!(48000.00), dec!(1.0)).with_leverage(10),
            TS + 3 * SEC,
        )
        .unwrap();

    let retry = exchange.process_liquidation(request, TS + 4 * SEC);
    assert!(retry.is_none(), "liquidation completed in one pass");
    assert!(exchange.positions(long).is_empty());

    let records = exchange.liquidation_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, "1.0".parse().unwrap());
    assert_eq!(records[0].insurance_loss, dec!(0));
}

// ── Round-trip laws ──────────────────────────────────────────────────────

#[test]
fn admit_then_cancel_restores_free_balance() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));

    let id = exchange
        .submit_at(limit(owner, Side::Buy, dec!(100.00), dec!(2.0)), TS)
        .unwrap();
    assert_eq!(exchange.account(owner).free("USDT"), dec!(800));
    assert_eq!(exchange.account(owner).reserved("USDT"), dec!(200));

    exchange.cancel_at(&id, owner, TS + 1).unwrap();
    assert_eq!(exchange.account(owner).free("USDT"), dec!(1000));
    assert_eq!(exchange.account(owner).reserved("USDT"), dec!(0));
    assert!(matches!(
        exchange.order(&id).unwrap().status,
        OrderStatus::Cancelled(_)
    ));
}

#[test]
fn price_improvement_refunds_the_taker() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(1));
    let buyer = trader(&exchange, dec!(1000), dec!(0));

    exchange
        .submit_at(limit(seller, Side::Sell, dec!(99.00), dec!(1.0)), TS)
        .unwrap();
    exchange
        .submit_at(limit(buyer, Side::Buy, dec!(101.00), dec!(1.0)), TS + 1)
        .unwrap();

    // Reserved 101, executed at 99: the difference comes back.
    assert_eq!(exchange.account(buyer).free("USDT"), dec!(901));
    assert_eq!(exchange.account(buyer).reserved("USDT"), dec!(0));
    assert_eq!(exchange.account(buyer).free("BTC"), dec!(1));
}

#[test]
fn cancel_errors_are_typed() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));
    let stranger = AccountId::new();

    let id = exchange
        .submit_at(limit(owner, Side::Buy, dec!(100.00), dec!(1.0)), TS)
        .unwrap();

    assert_eq!(
        exchange.cancel_at(&id, stranger, TS + 1),
        Err(CancelError::NotOwned)
    );
    exchange.cancel_at(&id, owner, TS + 2).unwrap();
    assert_eq!(
        exchange.cancel_at(&id, owner, TS + 3),
        Err(CancelError::Terminal)
    );
    assert_eq!(
        exchange.cancel_at(&types::ids::OrderId::new(), owner, TS + 4),
        Err(CancelError::NotFound)
    );
}

// ── GTD boundary ─────────────────────────────────────────────────────────

#[test]
fn gtd_expires_before_later_admissions() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(1));
    let buyer = trader(&exchange, dec!(1000), dec!(0));

    let expiry = TS + 100;
    let gtd = limit(seller, Side::Sell, dec!(100.00), dec!(1.0))
        .with_tif(TimeInForce::Gtd(expiry));
    let gtd_id = exchange.submit_at(gtd, TS).unwrap();

    // A crossing buy admitted at the expiry instant finds nothing.
    let buy_id = exchange
        .submit_at(limit(buyer, Side::Buy, dec!(100.00), dec!(1.0)), expiry)
        .unwrap();

    assert!(exchange.trade_log(&market()).is_empty());
    assert_eq!(exchange.order(&gtd_id).unwrap().status, OrderStatus::Expired);
    assert_eq!(exchange.order(&buy_id).unwrap().status, OrderStatus::Open);
    // The expired seller got its base back.
    assert_eq!(exchange.account(seller).free("BTC"), dec!(1));
}

// ── Iceberg ──────────────────────────────────────────────────────────────

#[test]
fn iceberg_shows_slices_and_fills_entirely() {
    let exchange = spot_exchange();
    let seller = trader(&exchange, dec!(0), dec!(10));
    let buyer = trader(&exchange, dec!(10000), dec!(0));

    let iceberg = limit(seller, Side::Sell, dec!(100.00), dec!(6.0)).with_display(dec!(2.0));
    let iceberg_id = exchange.submit_at(iceberg, TS).unwrap();

    let stats = exchange.market_stats(&market(), TS + 1).unwrap();
    assert_eq!(stats.best_ask, Some("100.00".parse().unwrap()));
    let (_, asks) = {
        let snap = exchange.snapshot_book(&market(), 5, TS + 1).unwrap();
        (snap.bids, snap.asks)
    };
    assert_eq!(asks[0].quantity, "2.0".parse().unwrap(), "only the slice shows");

    // Three market buys of 2.0 each chew through the slices.
    for i in 0..3 {
        exchange
            .submit_at(market_order(buyer, Side::Buy, dec!(2.0)), TS + 10 + i)
            .unwrap();
    }

    let order = exchange.order(&iceberg_id).unwrap();
    assert!(order.is_filled(), "status {:?}", order.status);
    assert_eq!(exchange.trade_log(&market()).len(), 3);
    assert_eq!(exchange.account(seller).free("USDT"), dec!(600));
    assert_eq!(exchange.account(seller).free("BTC"), dec!(4));
}

// ── OCO ──────────────────────────────────────────────────────────────────

#[test]
fn oco_fill_cancels_the_sibling() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));
    let seller = trader(&exchange, dec!(0), dec!(1));

    let low = limit(owner, Side::Buy, dec!(95.00), dec!(1.0));
    let high = limit(owner, Side::Buy, dec!(90.00), dec!(1.0));
    let (first, second) = exchange.submit_oco_at(low, high, TS).unwrap();

    // A sell into the 95 bid fills the first leg.
    exchange
        .submit_at(limit(seller, Side::Sell, dec!(95.00), dec!(1.0)), TS + 1)
        .unwrap();

    assert!(exchange.order(&first).unwrap().is_filled());
    assert_eq!(
        exchange.order(&second).unwrap().status,
        OrderStatus::Cancelled(types::order::CancelReason::LinkedOrder)
    );
    // Both reservations resolved: only the filled leg's cost is gone.
    assert_eq!(exchange.account(owner).reserved("USDT"), dec!(0));
    assert_eq!(exchange.account(owner).free("USDT"), dec!(905));
}

#[test]
fn oco_cancel_cancels_the_sibling() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));

    let (first, second) = exchange
        .submit_oco_at(
            limit(owner, Side::Buy, dec!(95.00), dec!(1.0)),
            limit(owner, Side::Buy, dec!(90.00), dec!(1.0)),
            TS,
        )
        .unwrap();

    exchange.cancel_at(&first, owner, TS + 1).unwrap();
    assert!(exchange.order(&second).unwrap().is_terminal());
    assert_eq!(exchange.account(owner).free("USDT"), dec!(1000));
}

// ── Bracket ──────────────────────────────────────────────────────────────

#[test]
fn bracket_spawns_children_and_child_fill_cancels_sibling() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));
    let counter = trader(&exchange, dec!(1000), dec!(2));

    let mut parent = limit(owner, Side::Buy, dec!(100.00), dec!(1.0));
    parent.order_type = OrderType::Bracket;
    parent.bracket = Some(types::order::BracketSpec {
        take_profit: dec!(110.00),
        stop_loss: dec!(90.00),
    });
    let parent_id = exchange.submit_at(parent, TS).unwrap();

    // Counterparty fills the parent.
    exchange
        .submit_at(limit(counter, Side::Sell, dec!(100.00), dec!(1.0)), TS + 1)
        .unwrap();

    let parent = exchange.order(&parent_id).unwrap();
    assert!(parent.is_filled());
    assert_eq!(parent.child_ids.len(), 2, "children spawned on first fill");

    let children: Vec<_> = parent
        .child_ids
        .iter()
        .map(|id| exchange.order(id).unwrap())
        .collect();
    let take_profit = children
        .iter()
        .find(|o| o.order_type == OrderType::Limit)
        .unwrap();
    let stop_loss = children
        .iter()
        .find(|o| o.order_type == OrderType::Stop)
        .unwrap();
    assert_eq!(take_profit.side, Side::Sell);
    assert_eq!(take_profit.quantity, "1.0".parse().unwrap());
    assert_eq!(stop_loss.stop_price, Some("90.00".parse().unwrap()));

    // Take-profit fills: the stop-loss dies with it.
    exchange
        .submit_at(limit(counter, Side::Buy, dec!(110.00), dec!(1.0)), TS + 2)
        .unwrap();
    assert!(exchange.order(&take_profit.id).unwrap().is_filled());
    assert!(exchange.order(&stop_loss.id).unwrap().is_terminal());
}

#[test]
fn cancelling_bracket_parent_cancels_children() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));
    let counter = trader(&exchange, dec!(0), dec!(1));

    let mut parent = limit(owner, Side::Buy, dec!(100.00), dec!(2.0));
    parent.order_type = OrderType::Bracket;
    parent.bracket = Some(types::order::BracketSpec {
        take_profit: dec!(110.00),
        stop_loss: dec!(90.00),
    });
    let parent_id = exchange.submit_at(parent, TS).unwrap();

    // Partial fill spawns children sized to the filled quantity.
    exchange
        .submit_at(limit(counter, Side::Sell, dec!(100.00), dec!(1.0)), TS + 1)
        .unwrap();
    let children = exchange.order(&parent_id).unwrap().child_ids.clone();
    assert_eq!(children.len(), 2);

    exchange.cancel_at(&parent_id, owner, TS + 2).unwrap();
    for child in &children {
        assert!(exchange.order(child).unwrap().is_terminal());
    }
}

// ── Back-pressure ────────────────────────────────────────────────────────

#[test]
fn overloaded_rejection_at_high_water() {
    let exchange = Exchange::new(EngineConfig {
        admission_high_water: 0,
        ..EngineConfig::default()
    });
    let mut spec = SymbolSpec::spot(market(), dec!(0.01), dec!(0.001));
    spec.fees = FeeSchedule::free();
    exchange.list_symbol(spec, TS);
    let owner = trader(&exchange, dec!(1000), dec!(0));

    let err = exchange
        .submit_at(limit(owner, Side::Buy, dec!(100.00), dec!(1.0)), TS)
        .unwrap_err();
    assert_eq!(err, RejectReason::Overloaded);
}

// ── Validation boundaries ────────────────────────────────────────────────

#[test]
fn zero_and_misaligned_orders_reject() {
    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));

    let err = exchange
        .submit_at(limit(owner, Side::Buy, dec!(100.00), dec!(0)), TS)
        .unwrap_err();
    assert!(matches!(err, RejectReason::QuantityOutOfRange { .. }));

    let err = exchange
        .submit_at(limit(owner, Side::Buy, dec!(100.005), dec!(1.0)), TS)
        .unwrap_err();
    assert!(matches!(err, RejectReason::PriceOffTick { .. }));

    let err = exchange
        .submit_at(
            limit(owner, Side::Buy, dec!(100.00), dec!(1.0)),
            TS,
        )
        .map(|_| ())
        .and_then(|_| {
            exchange
                .submit_at(
                    limit(owner, Side::Buy, dec!(100.00), dec!(100000)),
                    TS + 1,
                )
                .map(|_| ())
        })
        .unwrap_err();
    assert!(matches!(err, RejectReason::InsufficientBalance { .. }));

    let unknown = OrderRequest::limit(
        owner,
        MarketId::new("DOGE/USDT"),
        Side::Buy,
        dec!(1.00),
        dec!(1.0),
    );
    assert!(matches!(
        exchange.submit_at(unknown, TS + 2).unwrap_err(),
        RejectReason::UnknownSymbol { .. }
    ));
}

// ── Ledger conservation ──────────────────────────────────────────────────

#[test]
fn asset_totals_conserved_modulo_fees() {
    let exchange = Exchange::new(EngineConfig::default());
    let mut spec = SymbolSpec::spot(market(), dec!(0.01), dec!(0.001));
    spec.fees = FeeSchedule::new(dec!(0.0002), dec!(0.0005));
    exchange.list_symbol(spec, TS);

    let seller = trader(&exchange, dec!(0), dec!(2));
    let buyer = trader(&exchange, dec!(100000), dec!(0));

    exchange
        .submit_at(limit(seller, Side::Sell, dec!(50000.00), dec!(1.0)), TS)
        .unwrap();
    exchange
        .submit_at(limit(buyer, Side::Buy, dec!(50000.00), dec!(1.0)), TS + 1)
        .unwrap();

    let ledger = exchange.ledger();
    assert_eq!(
        ledger.total_in_circulation("USDT") + ledger.fees_collected("USDT"),
        dec!(100000)
    );
    assert_eq!(
        ledger.total_in_circulation("BTC") + ledger.fees_collected("BTC"),
        dec!(2)
    );
}

// ── Determinism ──────────────────────────────────────────────────────────

#[test]
fn identical_streams_produce_identical_trade_logs() {
    let run = || {
        let exchange = spot_exchange();
        let a = trader(&exchange, dec!(100000), dec!(100));
        let b = trader(&exchange, dec!(100000), dec!(100));

        let stream = [
            (a, Side::Sell, dec!(100.00), dec!(1.0)),
            (b, Side::Buy, dec!(100.00), dec!(0.4)),
            (b, Side::Buy, dec!(101.00), dec!(0.8)),
            (a, Side::Sell, dec!(99.00), dec!(0.5)),
            (b, Side::Buy, dec!(99.50), dec!(0.3)),
        ];
        for (i, (owner, side, price, qty)) in stream.into_iter().enumerate() {
            let _ = exchange.submit_at(limit(owner, side, price, qty), TS + i as i64);
        }
        exchange
            .trade_log(&market())
            .into_iter()
            .map(|t| (t.sequence, t.price, t.quantity, t.maker_side))
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

// ── Perpetual flow ───────────────────────────────────────────────────────

#[test]
fn perp_fills_update_positions_and_realize_pnl() {
    let exchange = perp_exchange();
    let long = trader(&exchange, dec!(20000), dec!(0));
    let short = trader(&exchange, dec!(20000), dec!(0));

    exchange
        .submit_at(
            limit(short, Side::Sell, dec!(50000.00), dec!(1.0)).with_leverage(10),
            TS,
        )
        .unwrap();
    exchange
        .submit_at(
            limit(long, Side::Buy, dec!(50000.00), dec!(1.0)).with_leverage(10),
            TS + 1,
        )
        .unwrap();

    let position = &exchange.positions(long)[0];
    assert_eq!(position.direction, types::position::Direction::Long);
    assert_eq!(position.entry_price, Some("50000".parse().unwrap()));
    assert_eq!(position.used_margin, dec!(5000));

    // Close half at 51,000: 500 realized.
    exchange
        .submit_at(
            limit(short, Side::Buy, dec!(51000.00), dec!(0.5)).with_leverage(10),
            TS + 2,
        )
        .unwrap();
    exchange
        .submit_at(
            limit(long, Side::Sell, dec!(51000.00), dec!(0.5))
                .with_leverage(10)
                .reduce_only(),
            TS + 3,
        )
        .unwrap();

    let position = &exchange.positions(long)[0];
    assert_eq!(position.size, "0.5".parse().unwrap());
    assert_eq!(position.realized_pnl, dec!(500));
    assert_eq!(exchange.ledger().wallet(long, "USDT"), dec!(20500));
}

#[test]
fn reduce_only_rejects_position_increase() {
    let exchange = perp_exchange();
    let owner = trader(&exchange, dec!(20000), dec!(0));

    let err = exchange
        .submit_at(
            limit(owner, Side::Sell, dec!(50000.00), dec!(1.0))
                .with_leverage(10)
                .reduce_only(),
            TS,
        )
        .unwrap_err();
    assert_eq!(err, RejectReason::ReduceOnlyViolation);
}

#[test]
fn leverage_above_symbol_cap_rejects() {
    let exchange = perp_exchange();
    let owner = trader(&exchange, dec!(1_000_000), dec!(0));

    let err = exchange
        .submit_at(
            limit(owner, Side::Buy, dec!(50000.00), dec!(1.0)).with_leverage(126),
            TS,
        )
        .unwrap_err();
    assert!(matches!(err, RejectReason::LeverageExceeded { .. }));
}

// ── Protocol dispatch ────────────────────────────────────────────────────

#[test]
fn envelope_round_trip_through_the_facade() {
    use trading_engine::protocol::{Request, RequestBody, ResponseBody, PROTOCOL_VERSION};

    let exchange = spot_exchange();
    let owner = trader(&exchange, dec!(1000), dec!(0));

    let response = exchange.handle(Request {
        correlation_id: "sub-1".into(),
        version: PROTOCOL_VERSION,
        body: RequestBody::Submit(Box::new(limit(owner, Side::Buy, dec!(100.00), dec!(1.0)))),
    });
    assert_eq!(response.correlation_id, "sub-1");
    let order_id = match response.body {
        ResponseBody::Accepted { order_id } => order_id,
        other => panic!("expected acceptance, got {other:?}"),
    };

    let response = exchange.handle(Request {
        correlation_id: "cxl-1".into(),
        version: PROTOCOL_VERSION,
        body: RequestBody::Cancel { order_id, owner },
    });
    assert_eq!(response.body, ResponseBody::Cancelled);

    let response = exchange.handle(Request {
        correlation_id: "snap-1".into(),
        version: PROTOCOL_VERSION,
        body: RequestBody::Snapshot {
            symbol: market(),
            depth: 5,
        },
    });
    assert!(matches!(response.body, ResponseBody::Snapshot(_)));
}
