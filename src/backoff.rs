//! Exponential backoff with jitter, shared by the transport retry layer and
//! the client's own retry loop.

use std::time::Duration;

use rand::Rng;

use crate::ClientOptions;

/// Upper bound for a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maps a 1-based attempt number to the delay before the next attempt.
///
/// `base(n) = min(30s, initial * 2^(n-1))`, and the actual delay scales
/// that by a jitter factor drawn uniformly from `[0.0, 1.0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffSchedule {
    initial: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration) -> Self {
        Self { initial }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.initial_backoff())
    }

    /// Delay before jitter. Non-decreasing in `attempt`, capped at [`MAX_BACKOFF`].
    pub fn base(&self, attempt: u32) -> Duration {
        // 2^31 already dwarfs the cap for any initial backoff above 1ns.
        let exp = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exp)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        let delay = self.base(attempt).mul_f64(jitter);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "computed backoff");

        delay
    }
}
