//! Background task orchestration
//!
//! Periodic loops with explicit tick rates: mark price every second,
//! funding rate every minute (settling on its own schedule), the position
//! monitor every second, GTD and option revaluation sweeps every second,
//! and the liquidation worker draining the bounded queue. Every loop is
//! cooperatively cancellable between lock sections via a watch channel.

use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{unix_now_ns, Exchange};

const MARK_TICK: Duration = Duration::from_secs(1);
const FUNDING_TICK: Duration = Duration::from_secs(60);
const MONITOR_TICK: Duration = Duration::from_secs(1);
const EXPIRY_TICK: Duration = Duration::from_secs(1);
const OPTIONS_TICK: Duration = Duration::from_secs(1);

/// Handles for the running background tasks.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Signal every loop to stop at its next safe point.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal and wait for every loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Spawn the full background runtime for an exchange.
pub fn spawn_all(exchange: Arc<Exchange>) -> BackgroundTasks {
    let (shutdown, _) = watch::channel(false);
    let handles = vec![
        spawn_mark_loop(exchange.clone(), shutdown.subscribe()),
        spawn_funding_loop(exchange.clone(), shutdown.subscribe()),
        spawn_monitor_loop(exchange.clone(), shutdown.subscribe()),
        spawn_expiry_loop(exchange.clone(), shutdown.subscribe()),
        spawn_options_loop(exchange.clone(), shutdown.subscribe()),
        spawn_liquidator(exchange, shutdown.subscribe()),
    ];
    BackgroundTasks { shutdown, handles }
}

fn spawn_mark_loop(exchange: Arc<Exchange>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(MARK_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    let now = unix_now_ns();
                    for spec in exchange.symbols() {
                        if !spec.is_perpetual() {
                            continue;
                        }
                        match exchange.risk().refresh_mark(&spec, now) {
                            Some(mark) => exchange.on_mark_update(&spec.market, mark, now),
                            None => debug!(symbol = %spec.market, "mark frozen, index stale"),
                        }
                    }
                }
            }
        }
    })
}

fn spawn_funding_loop(
    exchange: Arc<Exchange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FUNDING_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    let now = unix_now_ns();
                    for spec in exchange.symbols() {
                        if !spec.is_perpetual() {
                            continue;
                        }
                        if exchange.risk().refresh_funding_rate(&spec, now).is_none() {
                            debug!(symbol = %spec.market, "funding frozen, index stale");
                            continue;
                        }
                        if let Some((rate, transfers)) =
                            exchange.risk().settle_funding(&spec, now)
                        {
                            exchange.apply_funding_transfers(&spec, &transfers);
                            info!(
                                symbol = %spec.market,
                                %rate,
                                transfers = transfers.len(),
                                "funding settled"
                            );
                        }
                    }
                }
            }
        }
    })
}

fn spawn_monitor_loop(
    exchange: Arc<Exchange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(MONITOR_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    let now = unix_now_ns();
                    for spec in exchange.symbols() {
                        if !spec.is_perpetual() {
                            continue;
                        }
                        let quote = spec.market.quote().to_string();
                        let ledger = exchange.ledger();
                        let outcome = exchange.risk().monitor_symbol(&spec, now, &|owner| {
                            ledger.wallet(owner, &quote)
                        });
                        if outcome.stale {
                            debug!(symbol = %spec.market, "monitor suppressed, index stale");
                            continue;
                        }
                        for event in &outcome.events {
                            debug!(owner = %event.owner, kind = ?event.kind, "risk event");
                        }
                        let queue = exchange.liquidation_queue();
                        for request in outcome.liquidations {
                            warn!(
                                owner = %request.owner,
                                symbol = %request.symbol,
                                ratio = %request.margin_ratio,
                                "position under maintenance, enqueueing liquidation"
                            );
                            queue.try_enqueue(request);
                        }
                    }
                }
            }
        }
    })
}

fn spawn_expiry_loop(
    exchange: Arc<Exchange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(EXPIRY_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    let now = unix_now_ns();
                    for spec in exchange.symbols() {
                        exchange.sweep_expiries(&spec.market, now);
                    }
                }
            }
        }
    })
}

fn spawn_options_loop(
    exchange: Arc<Exchange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(OPTIONS_TICK);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {
                    let now = unix_now_ns();
                    for spec in exchange.symbols() {
                        let Some(mark) = exchange.risk().mark(&spec.market) else {
                            continue;
                        };
                        let Some(spot) = mark.as_decimal().to_f64() else {
                            continue;
                        };
                        let repriced = exchange.options().revalue(&spec.market, spot, now);
                        if repriced > 0 {
                            debug!(symbol = %spec.market, repriced, "options revalued");
                        }
                    }
                }
            }
        }
    })
}

fn spawn_liquidator(
    exchange: Arc<Exchange>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut rx) = exchange.take_liquidation_rx() else {
            warn!("liquidation receiver already taken");
            return;
        };
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                request = rx.recv() => {
                    let Some(request) = request else { break };
                    let now = unix_now_ns();
                    if let Some((retry, delay)) = exchange.process_liquidation(request, now) {
                        tokio::time::sleep(delay).await;
                        exchange.liquidation_queue().try_enqueue(retry);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    #[tokio::test]
    async fn background_tasks_start_and_stop() {
        let exchange = Arc::new(Exchange::new(EngineConfig::default()));
        let tasks = spawn_all(exchange);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tasks.stop().await;
    }

    #[tokio::test]
    async fn liquidation_rx_is_single_take() {
        let exchange = Arc::new(Exchange::new(EngineConfig::default()));
        assert!(exchange.take_liquidation_rx().is_some());
        assert!(exchange.take_liquidation_rx().is_none());
    }
}
