//! Background availability monitor.
//!
//! ```text
//! Idle ─(sleep base)→ Checking ─(sleep next_delay)→ Checking → … → Stopped
//! ```
//!
//! A healthy check resets the failure count, anything else bumps it. The
//! wait after each check is `base * min(1 + failures, 5)`, served by a
//! fresh ticker every cycle.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    timer::{sleep_or_cancel, IntervalTickerFactory, TickerFactory},
    ClientOptions, HealthReport, OverseerClient, Result,
};

/// Largest multiple of the base interval the monitor will wait.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 5;

/// Something the monitor can health-check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_health(&self, cancel: &CancellationToken) -> Result<HealthReport>;
}

#[async_trait]
impl HealthProbe for OverseerClient {
    async fn check_health(&self, cancel: &CancellationToken) -> Result<HealthReport> {
        self.health_check(cancel).await
    }
}

/// Delay before the next check after `failures` consecutive failures.
pub fn next_delay(base: Duration, failures: u32) -> Duration {
    let multiplier = failures.saturating_add(1).min(MAX_BACKOFF_MULTIPLIER);
    base.saturating_mul(multiplier)
}

/// Failure streak of a running monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorState {
    base_interval: Duration,
    failures: u32,
}

impl MonitorState {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn next_delay(&self) -> Duration {
        next_delay(self.base_interval, self.failures)
    }
}

pub struct AvailabilityMonitor {
    probe: Arc<dyn HealthProbe>,
    base_interval: Duration,
    tickers: Arc<dyn TickerFactory>,
}

impl std::fmt::Debug for AvailabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityMonitor")
            .field("base_interval", &self.base_interval)
            .finish_non_exhaustive()
    }
}

impl AvailabilityMonitor {
    /// Monitors `probe` every [`ClientOptions::monitor_interval`].
    pub fn new(probe: Arc<dyn HealthProbe>, options: &ClientOptions) -> Self {
        Self {
            probe,
            base_interval: options.monitor_interval(),
            tickers: Arc::new(IntervalTickerFactory),
        }
    }

    /// Monitors a client with its own options.
    pub fn for_client(client: &OverseerClient) -> Self {
        Self::new(Arc::new(client.clone()), client.options())
    }

    pub fn with_ticker_factory(mut self, tickers: Arc<dyn TickerFactory>) -> Self {
        self.tickers = tickers;
        self
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Runs the monitor on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Runs until `cancel` fires, whether that happens during a check or
    /// during a wait. No check is started after cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            interval_secs = self.base_interval.as_secs(),
            "availability monitor starting"
        );

        if sleep_or_cancel(self.base_interval, &cancel).await.is_ok() {
            self.check_loop(&cancel).await;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("availability monitor stopped");
    }

    async fn check_loop(&self, cancel: &CancellationToken) {
        let mut state = MonitorState::new(self.base_interval);
        while !cancel.is_cancelled() {
            match self.probe.check_health(cancel).await {
                Ok(report) if report.healthy => state.record_success(),
                Ok(report) => {
                    state.record_failure();
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        detail = %report.detail,
                        failures = state.failures(),
                        "overseer health check failed"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = report;
                }
                Err(err) if err.is_cancelled() => return,
                Err(err) => {
                    state.record_failure();
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        error = %err,
                        failures = state.failures(),
                        "error during overseer health check"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = err;
                }
            }

            let mut ticker = self.tickers.create(state.next_delay());
            if !ticker.tick(cancel).await {
                return;
            }
        }
    }
}
