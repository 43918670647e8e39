//! Facade statistics and operational probes
//!
//! Latency is measured in the facade from admission to response. The two
//! probes mirror what operators poll: a liveness document and a counters
//! document.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Running latency aggregate in nanoseconds.
#[derive(Debug, Default)]
struct LatencyAgg {
    count: u64,
    sum_ns: u64,
    min_ns: u64,
    max_ns: u64,
}

impl LatencyAgg {
    fn record(&mut self, ns: u64) {
        if self.count == 0 || ns < self.min_ns {
            self.min_ns = ns;
        }
        if ns > self.max_ns {
            self.max_ns = ns;
        }
        self.count += 1;
        self.sum_ns += ns;
    }
}

/// Counters and latency for one engine instance.
#[derive(Debug)]
pub struct EngineStats {
    orders_processed: AtomicU64,
    trades_executed: AtomicU64,
    latency: Mutex<LatencyAgg>,
    started: Instant,
}

/// Snapshot returned by the statistics probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub orders_processed: u64,
    pub trades_executed: u64,
    pub avg_latency_ns: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    /// Orders per second since start.
    pub throughput: f64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            orders_processed: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            latency: Mutex::new(LatencyAgg::default()),
            started: Instant::now(),
        }
    }

    pub fn record_order(&self, latency_ns: u64) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut agg) = self.latency.lock() {
            agg.record(latency_ns);
        }
    }

    pub fn record_trades(&self, count: u64) {
        self.trades_executed.fetch_add(count, Ordering::Relaxed);
    }

    /// Health probe payload.
    pub fn health(&self, timestamp: i64) -> serde_json::Value {
        serde_json::json!({
            "status": "healthy",
            "service": "trading-engine",
            "timestamp": timestamp,
        })
    }

    /// Statistics probe payload.
    pub fn snapshot(&self) -> StatsSnapshot {
        let orders = self.orders_processed.load(Ordering::Relaxed);
        let trades = self.trades_executed.load(Ordering::Relaxed);
        let (avg, min, max) = match self.latency.lock() {
            Ok(agg) if agg.count > 0 => (agg.sum_ns / agg.count, agg.min_ns, agg.max_ns),
            _ => (0, 0, 0),
        };
        let elapsed = self.started.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            orders as f64 / elapsed
        } else {
            0.0
        };
        StatsSnapshot {
            orders_processed: orders,
            trades_executed: trades,
            avg_latency_ns: avg,
            min_latency_ns: min,
            max_latency_ns: max,
            throughput,
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}
