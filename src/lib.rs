//! `arrsync` keeps an Overseerr request catalog in sync with deletions
//! made in Radarr and Sonarr.
//!
//! The crate provides:
//! - [`OverseerClient`] with [`OverseerClient::health_check`],
//!   [`OverseerClient::lookup_media_id`] and [`OverseerClient::delete_media`],
//!   each call going through a retry → circuit breaker → timeout pipeline
//! - [`AvailabilityMonitor`], a background health poller with adaptive cadence
//! - [`CleanupService`], the deletion entry point for webhook handlers

mod backoff;
mod breaker;
mod cleanup;
mod client;
mod error;
mod monitor;
mod options;
mod pipeline;
mod stats;
#[cfg(test)]
mod test_support;
mod timer;
mod transport;
mod types;
mod wire;

pub use backoff::{BackoffSchedule, MAX_BACKOFF};
pub use breaker::{
    BreakerPermit, CircuitBreaker, CircuitState, DEFAULT_COOL_DOWN, DEFAULT_FAILURE_THRESHOLD,
};
pub use cleanup::{CleanupService, DeletionOutcome};
pub use client::{media_delete_path, media_lookup_path, OverseerClient, STATUS_PATH};
pub use error::OverseerError;
pub use monitor::{next_delay, AvailabilityMonitor, HealthProbe, MonitorState, MAX_BACKOFF_MULTIPLIER};
pub use options::{ClientOptions, OverseerConfig, MAX_INTERVAL_SECS, MIN_INITIAL_BACKOFF_SECS};
pub use pipeline::{BreakerLayer, ResiliencePipeline, RetryLayer, TimeoutLayer};
pub use stats::{
    describe_metrics, CallStatus, Operation, OperationSnapshot, OperationStats, AVAILABLE,
    CALLS_TOTAL, FAILURES_TOTAL, LATENCY_SECONDS,
};
pub use timer::{
    sleep_or_cancel, IntervalTicker, IntervalTickerFactory, Ticker, TickerFactory, MAX_TICK_PERIOD,
};
pub use transport::{HttpTransport, Transport, UpstreamRequest, UpstreamResponse, API_KEY_HEADER};
pub use types::{Availability, HealthReport, MediaLookup, MediaType};
pub use wire::{MediaDetails, MediaInfo};

/// Re-exported so callers do not need a direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, OverseerError>;
