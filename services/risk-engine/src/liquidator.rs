//! Bounded liquidation queue
//!
//! The position monitor produces [`LiquidationRequest`]s; a single worker
//! (owned by the facade runtime) drains them and synthesises reduce-only
//! market orders. Band-aborted attempts re-enqueue with back-off.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use types::risk::LiquidationRequest;

/// Attempts before a request is abandoned to the insurance fund.
pub const MAX_ATTEMPTS: u32 = 5;

/// Exponential back-off for re-enqueued requests, capped at 5 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let millis = 250u64.saturating_mul(1 << attempt.min(6));
    Duration::from_millis(millis.min(5_000))
}

/// Producer handle for the bounded liquidation channel.
#[derive(Debug, Clone)]
pub struct LiquidationQueue {
    tx: mpsc::Sender<LiquidationRequest>,
}

impl LiquidationQueue {
    /// Enqueue without blocking. A full queue drops the request: the
    /// monitor re-discovers the position on its next tick.
    pub fn try_enqueue(&self, request: LiquidationRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(
                    owner = %request.owner,
                    symbol = %request.symbol,
                    "liquidation queue full, deferring to next monitor tick"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("liquidation queue closed");
                false
            }
        }
    }
}

/// Build the bounded channel: producer for the monitor, receiver for the
/// worker.
pub fn liquidation_channel(
    capacity: usize,
) -> (LiquidationQueue, mpsc::Receiver<LiquidationRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (LiquidationQueue { tx }, rx)
}
