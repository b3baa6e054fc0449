//! Upstream call metrics.
//!
//! # Metrics
//! - `arrsync_overseer_calls_total` (counter): calls by `operation`, `status`
//! - `arrsync_overseer_failures_total` (counter): failed attempts by `operation`
//! - `arrsync_overseer_latency_seconds` (histogram): attempt latency by `operation`
//! - `arrsync_overseer_available` (gauge): 1 = available, 0 = unavailable
//!
//! Everything is emitted through the `metrics` facade; the embedding
//! application installs the exporter. Each client additionally keeps its own
//! call tally, readable through [`OperationStats::snapshot`].

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const CALLS_TOTAL: &str = "arrsync_overseer_calls_total";
pub const FAILURES_TOTAL: &str = "arrsync_overseer_failures_total";
pub const LATENCY_SECONDS: &str = "arrsync_overseer_latency_seconds";
pub const AVAILABLE: &str = "arrsync_overseer_available";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    GetMedia,
    DeleteMedia,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Self::Health, Self::GetMedia, Self::DeleteMedia];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::GetMedia => "getMedia",
            Self::DeleteMedia => "deleteMedia",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallStatus {
    Start,
    Ok,
    Error,
    Exception,
    Skipped,
    NotFound,
}

impl CallStatus {
    pub const ALL: [CallStatus; 6] = [
        Self::Start,
        Self::Ok,
        Self::Error,
        Self::Exception,
        Self::Skipped,
        Self::NotFound,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Exception => "exception",
            Self::Skipped => "skipped",
            Self::NotFound => "notfound",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Registers descriptions and units with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(CALLS_TOTAL, "Total number of Overseer calls");
    describe_counter!(FAILURES_TOTAL, "Total Overseer failures");
    describe_histogram!(LATENCY_SECONDS, Unit::Seconds, "Overseer call latency in seconds");
    describe_gauge!(AVAILABLE, "Overseer availability (1 = available, 0 = unavailable)");
}

pub fn record_availability(available: bool) {
    gauge!(AVAILABLE).set(if available { 1.0 } else { 0.0 });
}

const OPS: usize = Operation::ALL.len();
const STATUSES: usize = CallStatus::ALL.len();

#[derive(Debug, Default)]
struct OperationCounters {
    calls: [AtomicU64; STATUSES],
    failures: AtomicU64,
}

/// Point-in-time copy of one operation's tally on a single client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub start: u64,
    pub ok: u64,
    pub error: u64,
    pub exception: u64,
    pub skipped: u64,
    pub not_found: u64,
    /// Failed attempts, including ones later recovered by a retry.
    pub failures: u64,
}

impl OperationSnapshot {
    pub fn count(&self, status: CallStatus) -> u64 {
        match status {
            CallStatus::Start => self.start,
            CallStatus::Ok => self.ok,
            CallStatus::Error => self.error,
            CallStatus::Exception => self.exception,
            CallStatus::Skipped => self.skipped,
            CallStatus::NotFound => self.not_found,
        }
    }
}

/// Records call outcomes to the `metrics` facade and to a per-client tally.
#[derive(Debug, Default)]
pub struct OperationStats {
    operations: [OperationCounters; OPS],
}

impl OperationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: Operation, status: CallStatus) {
        counter!(CALLS_TOTAL, "operation" => operation.as_str(), "status" => status.as_str())
            .increment(1);
        self.operations[operation.index()].calls[status.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, operation: Operation) {
        counter!(FAILURES_TOTAL, "operation" => operation.as_str()).increment(1);
        self.operations[operation.index()]
            .failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, operation: Operation, elapsed: Duration) {
        histogram!(LATENCY_SECONDS, "operation" => operation.as_str()).record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self, operation: Operation) -> OperationSnapshot {
        let counters = &self.operations[operation.index()];
        let load = |status: CallStatus| counters.calls[status.index()].load(Ordering::Relaxed);
        OperationSnapshot {
            start: load(CallStatus::Start),
            ok: load(CallStatus::Ok),
            error: load(CallStatus::Error),
            exception: load(CallStatus::Exception),
            skipped: load(CallStatus::Skipped),
            not_found: load(CallStatus::NotFound),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{
        record_availability, testing::Captured, CallStatus, Operation, OperationStats, AVAILABLE,
        CALLS_TOTAL, FAILURES_TOTAL, LATENCY_SECONDS,
    };

    #[test]
    fn counters_are_kept_per_operation() {
        let stats = OperationStats::new();
        stats.record(Operation::GetMedia, CallStatus::Start);
        stats.record(Operation::GetMedia, CallStatus::Skipped);
        stats.record(Operation::DeleteMedia, CallStatus::Ok);
        stats.record_failure(Operation::GetMedia);

        let lookup = stats.snapshot(Operation::GetMedia);
        assert_eq!(lookup.start, 1);
        assert_eq!(lookup.count(CallStatus::Skipped), 1);
        assert_eq!(lookup.failures, 1);
        assert_eq!(lookup.ok, 0);
        assert_eq!(stats.snapshot(Operation::DeleteMedia).ok, 1);
        assert_eq!(stats.snapshot(Operation::Health).start, 0);
    }

    #[test]
    fn calls_are_emitted_with_operation_and_status_labels() {
        let ((), captured) = Captured::during(|| {
            let stats = OperationStats::new();
            stats.record(Operation::GetMedia, CallStatus::Start);
            stats.record(Operation::GetMedia, CallStatus::NotFound);
            stats.record(Operation::GetMedia, CallStatus::Start);
            stats.record_failure(Operation::DeleteMedia);
        });

        let calls = |operation, status| {
            captured.counter(CALLS_TOTAL, &[("operation", operation), ("status", status)])
        };
        assert_eq!(calls("getMedia", "start"), 2);
        assert_eq!(calls("getMedia", "notfound"), 1);
        assert_eq!(calls("health", "start"), 0);
        assert_eq!(captured.counter(FAILURES_TOTAL, &[("operation", "deleteMedia")]), 1);
    }

    #[test]
    fn latency_goes_to_a_histogram() {
        let ((), captured) = Captured::during(|| {
            let stats = OperationStats::new();
            stats.record_latency(Operation::Health, Duration::from_millis(3));
            stats.record_latency(Operation::Health, Duration::from_millis(7));
        });
        assert_eq!(
            captured.histogram_samples(LATENCY_SECONDS, &[("operation", "health")]),
            2
        );
    }

    #[test]
    fn availability_gauge_tracks_the_last_value() {
        let ((), captured) = Captured::during(|| {
            record_availability(true);
            record_availability(false);
        });
        assert_eq!(captured.gauge(AVAILABLE), Some(0.0));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(OperationStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        stats.record(Operation::DeleteMedia, CallStatus::Start);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker must not panic");
        }
        assert_eq!(stats.snapshot(Operation::DeleteMedia).start, 8_000);
    }

    #[test]
    fn labels_match_metric_names() {
        let labels: Vec<_> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        assert_eq!(labels, ["health", "getMedia", "deleteMedia"]);
        assert_eq!(CallStatus::NotFound.as_str(), "notfound");
    }
}
