//! Property tests for the matching core.
//!
//! Random admission streams must never leave a crossed book, never create
//! or destroy quantity, and must replay deterministically.

use matching_engine::{MatchEngine, Residual};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use types::fee::FeeSchedule;
use types::ids::{AccountId, MarketId};
use types::numeric::Price;
use types::order::{Order, OrderType, Side, TimeInForce};
use types::symbol::SymbolSpec;

const TS: i64 = 1_718_000_000_000_000_000;

#[derive(Debug, Clone)]
struct Op {
    side: Side,
    /// Price in ticks of 0.01 above 90.00.
    price_ticks: u32,
    /// Quantity in lots of 0.001.
    qty_lots: u32,
    tif: TimeInForce,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (
        prop::bool::ANY,
        0u32..2000,
        1u32..5000,
        prop_oneof![
            Just(TimeInForce::Gtc),
            Just(TimeInForce::Ioc),
            Just(TimeInForce::Fok),
        ],
    )
        .prop_map(|(buy, price_ticks, qty_lots, tif)| Op {
            side: if buy { Side::Buy } else { Side::Sell },
            price_ticks,
            qty_lots,
            tif,
        })
}

fn engine() -> MatchEngine {
    let mut spec = SymbolSpec::spot(MarketId::new("BTC/USDT"), dec!(0.01), dec!(0.001));
    spec.fees = FeeSchedule::free();
    MatchEngine::new(spec)
}

fn order_for(op: &Op, owner: AccountId, nonce: i64) -> Order {
    let price = Price::new(dec!(90.00) + Decimal::new(op.price_ticks as i64, 2));
    let qty = Decimal::new(op.qty_lots as i64, 3);
    let mut order = Order::new(
        owner,
        MarketId::new("BTC/USDT"),
        op.side,
        OrderType::Limit,
        op.tif,
        Some(price),
        types::numeric::Quantity::new(qty),
        TS + nonce,
    );
    order.time_in_force = op.tif;
    order
}

proptest! {
    /// After every operation the book is uncrossed and aggregates are
    /// consistent.
    #[test]
    fn book_never_crossed_at_rest(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut engine = engine();
        for (i, op) in ops.iter().enumerate() {
            // Distinct owners: self-trade prevention stays out of the way.
            let owner = AccountId::new();
            let order = order_for(op, owner, i as i64);
            let outcome = engine.submit(order, None, None, TS + i as i64).unwrap();

            prop_assert!(!engine.book().is_crossed(), "crossed after op {i}");
            if let (Some((bid, _)), Some((ask, _))) =
                (engine.book().best_bid(), engine.book().best_ask())
            {
                prop_assert!(bid < ask);
            }
            // Residual classification is total.
            prop_assert!(matches!(
                outcome.residual,
                Residual::None
                    | Residual::Rested
                    | Residual::Cancelled
                    | Residual::RejectedFok
            ));
        }
    }

    /// Fills never exceed the order quantity, and each trade's quantity is
    /// positive at the maker's price.
    #[test]
    fn quantity_is_conserved(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut engine = engine();
        for (i, op) in ops.iter().enumerate() {
            let order = order_for(op, AccountId::new(), i as i64);
            let submitted_qty = order.quantity;
            let limit = order.price.unwrap();
            let outcome = engine.submit(order, None, None, TS + i as i64).unwrap();

            let filled: Decimal = outcome
                .trades
                .iter()
                .map(|t| t.quantity.as_decimal())
                .sum();
            prop_assert!(filled <= submitted_qty.as_decimal());
            prop_assert_eq!(filled, outcome.taker.filled.as_decimal());

            for trade in &outcome.trades {
                prop_assert!(trade.quantity.as_decimal() > Decimal::ZERO);
                // Price improvement: never worse than the taker's limit.
                match op.side {
                    Side::Buy => prop_assert!(trade.price <= limit),
                    Side::Sell => prop_assert!(trade.price >= limit),
                }
            }
        }
    }

    /// FOK either fully fills or leaves no trace.
    #[test]
    fn fok_is_atomic(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut engine = engine();
        for (i, op) in ops.iter().enumerate() {
            let order = order_for(op, AccountId::new(), i as i64);
            let qty = order.quantity;
            let is_fok = op.tif == TimeInForce::Fok;
            let depth_before = engine.book().open_order_count();
            let outcome = engine.submit(order, None, None, TS + i as i64).unwrap();

            if is_fok {
                match outcome.residual {
                    Residual::None => prop_assert_eq!(outcome.taker.filled, qty),
                    Residual::RejectedFok => {
                        prop_assert!(outcome.trades.is_empty());
                        prop_assert_eq!(engine.book().open_order_count(), depth_before);
                    }
                    other => prop_assert!(false, "FOK residual {other:?}"),
                }
            }
        }
    }

    /// Two engines fed the same stream emit identical trade logs.
    #[test]
    fn matching_is_deterministic(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let owners: Vec<AccountId> = (0..ops.len()).map(|_| AccountId::new()).collect();

        let run = || {
            let mut engine = engine();
            let mut log = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                let mut order = order_for(op, owners[i], i as i64);
                // Same order identity in both runs.
                order.id = types::ids::OrderId::from_uuid(uuid_for(i));
                let outcome = engine.submit(order, None, None, TS + i as i64).unwrap();
                for t in outcome.trades {
                    log.push((t.sequence, t.maker_order_id, t.taker_order_id, t.price, t.quantity));
                }
            }
            log
        };

        prop_assert_eq!(run(), run());
    }
}

fn uuid_for(i: usize) -> uuid::Uuid {
    uuid::Uuid::from_u128(0xfeed_0000_0000_0000_0000u128 + i as u128)
}

/// Maker queue position survives unrelated cancels.
#[test]
fn priority_survives_middle_cancel() {
    let mut engine = engine();
    let owners: Vec<AccountId> = (0..3).map(|_| AccountId::new()).collect();
    let mut ids = Vec::new();
    for (i, owner) in owners.iter().enumerate() {
        let order = Order::new(
            *owner,
            MarketId::new("BTC/USDT"),
            Side::Sell,
            OrderType::Limit,
            TimeInForce::Gtc,
            Some("100.00".parse().unwrap()),
            "1.0".parse().unwrap(),
            TS + i as i64,
        );
        ids.push(order.id);
        engine.submit(order, None, None, TS + i as i64).unwrap();
    }

    // Cancel the middle maker; the first keeps priority.
    engine.cancel(&ids[1]).unwrap();
    let taker = Order::new(
        AccountId::new(),
        MarketId::new("BTC/USDT"),
        Side::Buy,
        OrderType::Limit,
        TimeInForce::Gtc,
        Some("100.00".parse().unwrap()),
        "1.5".parse().unwrap(),
        TS + 10,
    );
    let outcome = engine.submit(taker, None, None, TS + 10).unwrap();
    assert_eq!(outcome.trades.len(), 2);
    assert_eq!(outcome.trades[0].maker_order_id, ids[0]);
    assert_eq!(outcome.trades[1].maker_order_id, ids[2]);
}
