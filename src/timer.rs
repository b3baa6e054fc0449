//! Cancellable waits.
//!
//! Every suspension point in the crate goes through this module so that a
//! fired [`CancellationToken`] ends the wait on the next poll.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{OverseerError, Result};

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OverseerError::Cancelled),
        _ = time::sleep(delay) => Ok(()),
    }
}

/// A recurring tick source.
#[async_trait]
pub trait Ticker: Send {
    /// Waits for the next tick. Returns `false` when `cancel` fired instead.
    async fn tick(&mut self, cancel: &CancellationToken) -> bool;
}

/// Creates tickers; the monitor asks for a new one every cycle so the
/// period can change between cycles.
pub trait TickerFactory: Send + Sync {
    fn create(&self, period: Duration) -> Box<dyn Ticker>;
}

/// [`TickerFactory`] backed by [`tokio::time::interval_at`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IntervalTickerFactory;

impl TickerFactory for IntervalTickerFactory {
    fn create(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(IntervalTicker::new(period))
    }
}

/// Longest period an [`IntervalTicker`] will wait between ticks.
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Ticks once per period; the first tick is one full period after creation.
/// Periods are clamped to `1ms..=`[`MAX_TICK_PERIOD`].
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let period = period.clamp(Duration::from_millis(1), MAX_TICK_PERIOD);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }
}
