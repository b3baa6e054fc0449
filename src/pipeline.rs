//! Resilience pipeline wrapped around every upstream call.
//!
//! # Data Flow
//! ```text
//! RetryLayer        retries transient outcomes with jittered backoff
//!   → BreakerLayer  fails fast while the circuit is open
//!     → TimeoutLayer  bounds one attempt, observes cancellation
//!       → Transport
//! ```
//!
//! Each retry attempt therefore gets its own breaker check and its own
//! timeout. Every layer is a [`Transport`] and can be used on its own.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::BackoffSchedule,
    breaker::{CircuitBreaker, CircuitState},
    timer::sleep_or_cancel,
    ClientOptions, OverseerError, Result, Transport, UpstreamRequest, UpstreamResponse,
};

/// Innermost layer: one attempt, bounded by `timeout`.
#[derive(Debug)]
pub struct TimeoutLayer<T> {
    inner: T,
    timeout: Duration,
}

impl<T> TimeoutLayer<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: Transport> Transport for TimeoutLayer<T> {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OverseerError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.inner.send(request, cancel)) => {
                outcome.unwrap_or(Err(OverseerError::Timeout(self.timeout)))
            }
        }
    }
}

/// Counts transient failures of the inner layer and short-circuits calls
/// while the breaker is open.
#[derive(Debug)]
pub struct BreakerLayer<T> {
    inner: T,
    breaker: Arc<CircuitBreaker>,
}

impl<T> BreakerLayer<T> {
    pub fn new(inner: T, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl<T: Transport> Transport for BreakerLayer<T> {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        if cancel.is_cancelled() {
            return Err(OverseerError::Cancelled);
        }
        let permit = self.breaker.acquire()?;

        let outcome = self.inner.send(request, cancel).await;
        match &outcome {
            Ok(response) if response.is_transient() => permit.record_failure(),
            Ok(_) => permit.record_success(),
            Err(err) if err.is_transient() => permit.record_failure(),
            // Cancelled: dropping the permit releases it uncounted.
            Err(_) => drop(permit),
        }
        outcome
    }
}

/// Outermost layer: retries transient outcomes up to `max_retries` times.
///
/// Circuit-open and cancellation errors are returned as-is. When retries
/// run out on a 5xx the last response is returned, not an error.
#[derive(Debug)]
pub struct RetryLayer<T> {
    inner: T,
    max_retries: u32,
    schedule: BackoffSchedule,
}

impl<T> RetryLayer<T> {
    pub fn new(inner: T, max_retries: u32, schedule: BackoffSchedule) -> Self {
        Self {
            inner,
            max_retries,
            schedule,
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryLayer<T> {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.inner.send(request, cancel).await;
            let transient = match &outcome {
                Ok(response) => response.is_transient(),
                Err(err) => err.is_transient(),
            };
            if !transient || attempt > self.max_retries {
                return outcome;
            }

            let delay = self.schedule.delay(attempt);
            #[cfg(feature = "tracing")]
            match &outcome {
                Ok(response) => tracing::debug!(
                    path = %request.path,
                    attempt,
                    status = response.status,
                    delay_ms = delay.as_millis() as u64,
                    "transient upstream status, retrying"
                ),
                Err(err) => tracing::debug!(
                    path = %request.path,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transient upstream error, retrying"
                ),
            }
            sleep_or_cancel(delay, cancel).await?;
        }
    }
}

type Chain = RetryLayer<BreakerLayer<TimeoutLayer<Arc<dyn Transport>>>>;

/// The composed retry → breaker → timeout chain.
pub struct ResiliencePipeline {
    chain: Chain,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ResiliencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResiliencePipeline")
            .field("max_retries", &self.chain.max_retries)
            .field("timeout", &self.chain.inner.inner.timeout)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl ResiliencePipeline {
    pub fn new(transport: Arc<dyn Transport>, options: &ClientOptions) -> Self {
        Self::with_breaker(transport, options, Arc::new(CircuitBreaker::default()))
    }

    pub fn with_breaker(
        transport: Arc<dyn Transport>,
        options: &ClientOptions,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let timeout = TimeoutLayer::new(transport, options.timeout());
        let guarded = BreakerLayer::new(timeout, Arc::clone(&breaker));
        let chain = RetryLayer::new(
            guarded,
            options.max_retries,
            BackoffSchedule::from_options(options),
        );
        Self { chain, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[async_trait]
impl Transport for ResiliencePipeline {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        self.chain.send(request, cancel).await
    }
}
