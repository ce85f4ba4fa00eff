//! A ticker driven by the test.
//!
//! [`ManualTicker::new`] returns the ticker, to hand to a `SweepScheduler`,
//! and a [`ManualTickerHandle`] that fires it. Dropping every handle
//! exhausts the ticker, which stops the scheduler once pending ticks are
//! consumed.

use bookclub_runtime::Ticker;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Ticker that fires only when its handle says so
#[derive(Debug)]
pub struct ManualTicker {
    ticks: mpsc::UnboundedReceiver<DateTime<Utc>>,
}

/// Fires a [`ManualTicker`]
#[derive(Debug, Clone)]
pub struct ManualTickerHandle {
    ticks: mpsc::UnboundedSender<DateTime<Utc>>,
}

impl ManualTicker {
    /// Creates a ticker and the handle that fires it
    #[must_use]
    pub fn new() -> (Self, ManualTickerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { ticks: rx }, ManualTickerHandle { ticks: tx })
    }
}

impl Ticker for ManualTicker {
    fn tick(&mut self) -> Pin<Box<dyn Future<Output = Option<DateTime<Utc>>> + Send + '_>> {
        Box::pin(self.ticks.recv())
    }
}

impl ManualTickerHandle {
    /// Queues one tick stamped with the current wall time.
    ///
    /// Returns `false` once the ticker has been dropped.
    pub fn tick(&self) -> bool {
        self.tick_at(Utc::now())
    }

    /// Queues one tick stamped `at`
    pub fn tick_at(&self, at: DateTime<Utc>) -> bool {
        self.ticks.send(at).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_in_order_then_exhausts() {
        let (mut ticker, handle) = ManualTicker::new();
        let first = Utc::now();
        assert!(handle.tick_at(first));
        assert!(handle.tick());
        drop(handle);

        assert_eq!(ticker.tick().await, Some(first));
        assert!(ticker.tick().await.is_some());
        assert_eq!(ticker.tick().await, None);
    }
}
