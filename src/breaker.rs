//! Circuit breaker for the upstream.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     consecutive transient failures >= threshold
//! Open     → HalfOpen: cool-down elapsed, next caller becomes the trial
//! HalfOpen → Closed:   trial succeeds
//! HalfOpen → Open:     trial fails, cool-down restarts
//! ```
//!
//! Only one trial runs at a time; other callers keep failing fast until it
//! resolves. Every transition starts a new generation, and a
//! [`BreakerPermit`] only reports into the generation it was issued in, so
//! calls that started before the circuit opened cannot close it again.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::{OverseerError, Result};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Abandoned,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cool_down: Duration,
    inner: Mutex<BreakerInner>,
}

/// Permission for one call, handed out by [`CircuitBreaker::acquire`].
///
/// Report the outcome with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping the permit without
/// reporting counts as abandoned: nothing is counted and a half-open trial
/// slot is released.
#[derive(Debug)]
#[must_use = "a permit must report its outcome"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn record_failure(mut self) {
        self.settle(Outcome::Failure);
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.generation, self.trial, outcome);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(Outcome::Abandoned);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOL_DOWN)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cool_down: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cool_down,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open circuit whose cool-down has elapsed reports
    /// `HalfOpen`, since the next call would be let through as the trial.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.cool_down_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Asks permission for one call. Fails fast with
    /// [`OverseerError::CircuitOpen`] while open or while a trial is running.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if !self.cool_down_elapsed(&inner) {
                    return Err(OverseerError::CircuitOpen);
                }
                inner.state = CircuitState::HalfOpen;
                inner.generation += 1;
                inner.trial_in_flight = true;
                #[cfg(feature = "tracing")]
                tracing::info!("circuit half-open, sending trial request");
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(OverseerError::CircuitOpen);
                }
                inner.trial_in_flight = true;
                true
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            generation: inner.generation,
            trial,
            settled: false,
        })
    }

    fn settle(&self, generation: u64, trial: bool, outcome: Outcome) {
        let mut inner = self.lock();
        if generation != inner.generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(?outcome, "ignoring outcome from an earlier circuit phase");
            return;
        }

        match (inner.state, outcome) {
            (CircuitState::Closed, Outcome::Success) => inner.consecutive_failures = 0,
            (CircuitState::Closed, Outcome::Failure) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.threshold {
                    self.trip(&mut inner);
                }
            }
            (CircuitState::HalfOpen, Outcome::Success) if trial => {
                #[cfg(feature = "tracing")]
                tracing::info!("circuit closed");
                inner.state = CircuitState::Closed;
                inner.generation += 1;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
            }
            (CircuitState::HalfOpen, Outcome::Failure) if trial => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                self.trip(&mut inner);
            }
            (CircuitState::HalfOpen, Outcome::Abandoned) if trial => {
                inner.trial_in_flight = false;
            }
            _ => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            failures = inner.consecutive_failures,
            cool_down_secs = self.cool_down.as_secs(),
            "circuit opened"
        );
        inner.state = CircuitState::Open;
        inner.generation += 1;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
    }

    fn cool_down_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.cool_down)
    }
}
