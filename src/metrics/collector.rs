use dashmap::DashMap;
use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::classifier::{CallOutcome, CallType};

/// Highest trackable latency: 10 minutes, in microseconds
const MAX_TRACKABLE_MICROS: u64 = 600_000_000;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKABLE_MICROS, 3).expect("static histogram bounds are valid")
}

/// Aggregate taken over a latency histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyStat {
    Percentile(f64),
    Avg,
    Med,
    Min,
    Max,
}

/// Read one statistic in milliseconds; `None` when there are no samples
pub fn latency_stat_ms(histogram: &Histogram<u64>, stat: LatencyStat) -> Option<f64> {
    if histogram.is_empty() {
        return None;
    }
    let micros = match stat {
        LatencyStat::Percentile(p) => histogram.value_at_percentile(p) as f64,
        LatencyStat::Med => histogram.value_at_percentile(50.0) as f64,
        LatencyStat::Avg => histogram.mean(),
        LatencyStat::Min => histogram.min() as f64,
        LatencyStat::Max => histogram.max() as f64,
    };
    Some(micros / 1000.0)
}

/// Per-call-type accumulators
struct CallStats {
    latency_histogram: Mutex<Histogram<u64>>,
    requests: AtomicU64,
    failures: AtomicU64,
    transport_errors: AtomicU64,
}

impl CallStats {
    fn new() -> Self {
        Self {
            latency_histogram: Mutex::new(new_histogram()),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        }
    }
}

/// Thread-safe SLI accumulator shared by every virtual user
pub struct MetricsCollector {
    /// Indexed by `CallType::index`
    per_call: [CallStats; 4],

    /// Latency over all call types (microseconds)
    overall_histogram: Mutex<Histogram<u64>>,

    /// Business-failure rate numerator and denominator
    total_calls: AtomicU64,
    failed_calls: AtomicU64,

    /// Response counts keyed by call type and status code
    status_counts: DashMap<(CallType, u16), AtomicU64>,

    /// Iteration lifecycle counters fed by the scheduler
    iterations_started: AtomicU64,
    iterations_completed: AtomicU64,
    iterations_interrupted: AtomicU64,
    dropped_iterations: AtomicU64,

    start_time: Mutex<Option<Instant>>,
    end_time: Mutex<Option<Instant>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            per_call: [
                CallStats::new(),
                CallStats::new(),
                CallStats::new(),
                CallStats::new(),
            ],
            overall_histogram: Mutex::new(new_histogram()),
            total_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            status_counts: DashMap::new(),
            iterations_started: AtomicU64::new(0),
            iterations_completed: AtomicU64::new(0),
            iterations_interrupted: AtomicU64::new(0),
            dropped_iterations: AtomicU64::new(0),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
        }
    }

    /// Mark the start of the run
    pub fn start(&self) {
        if let Ok(mut start) = self.start_time.lock() {
            *start = Some(Instant::now());
        }
    }

    /// Mark the end of the run
    pub fn stop(&self) {
        if let Ok(mut end) = self.end_time.lock() {
            *end = Some(Instant::now());
        }
    }

    /// Record one classified call
    pub fn record(&self, outcome: &CallOutcome) {
        let stats = &self.per_call[outcome.call.index()];

        match outcome.status {
            Some(status) => {
                let latency_us = (outcome.latency.as_micros() as u64).max(1);
                if let Ok(mut hist) = stats.latency_histogram.lock() {
                    hist.saturating_record(latency_us);
                }
                if let Ok(mut hist) = self.overall_histogram.lock() {
                    hist.saturating_record(latency_us);
                }
                self.status_counts
                    .entry((outcome.call, status))
                    .or_insert_with(|| AtomicU64::new(0))
                    .fetch_add(1, Ordering::Relaxed);
            }
            None => {
                stats.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        stats.requests.fetch_add(1, Ordering::Relaxed);
        // total is bumped before failed so a concurrent reader never sees failed > total
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if outcome.is_business_failure() {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_iteration_started(&self) {
        self.iterations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_iteration_completed(&self) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_iteration_interrupted(&self) {
        self.iterations_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduled start that found no free virtual user
    pub fn record_dropped_iteration(&self) {
        self.dropped_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::SeqCst)
    }

    pub fn dropped_iterations(&self) -> u64 {
        self.dropped_iterations.load(Ordering::Relaxed)
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        let start = self.start_time.lock().ok().and_then(|s| *s);
        let end = self.end_time.lock().ok().and_then(|e| *e);
        match (start, end) {
            (Some(s), Some(e)) => e.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Create a read-only copy of every aggregate
    pub fn snapshot(&self) -> MetricsSnapshot {
        let failed_calls = self.failed_calls();
        let total_calls = self.total_calls();

        let calls = CallType::ALL
            .iter()
            .map(|&call| {
                let stats = &self.per_call[call.index()];
                let latency = stats
                    .latency_histogram
                    .lock()
                    .map(|h| h.clone())
                    .unwrap_or_else(|_| new_histogram());
                let status_counts = self
                    .status_counts
                    .iter()
                    .filter(|entry| entry.key().0 == call)
                    .map(|entry| (entry.key().1, entry.value().load(Ordering::Relaxed)))
                    .collect();

                CallSnapshot {
                    call,
                    requests: stats.requests.load(Ordering::Relaxed),
                    failures: stats.failures.load(Ordering::Relaxed),
                    transport_errors: stats.transport_errors.load(Ordering::Relaxed),
                    latency,
                    status_counts,
                }
            })
            .collect();

        let overall_latency = self
            .overall_histogram
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|_| new_histogram());

        MetricsSnapshot {
            calls,
            overall_latency,
            total_calls,
            failed_calls,
            iterations_started: self.iterations_started.load(Ordering::Relaxed),
            iterations_completed: self.iterations_completed.load(Ordering::Relaxed),
            iterations_interrupted: self.iterations_interrupted.load(Ordering::Relaxed),
            dropped_iterations: self.dropped_iterations(),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen aggregates for one call type
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub call: CallType,
    pub requests: u64,
    pub failures: u64,
    pub transport_errors: u64,
    pub latency: Histogram<u64>,
    pub status_counts: BTreeMap<u16, u64>,
}

/// Frozen aggregates for the whole run
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// One entry per `CallType::ALL`, same order
    pub calls: Vec<CallSnapshot>,
    pub overall_latency: Histogram<u64>,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub iterations_started: u64,
    pub iterations_completed: u64,
    pub iterations_interrupted: u64,
    pub dropped_iterations: u64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Business failures over all calls; 0 when nothing was called
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64
    }

    pub fn call(&self, call: CallType) -> &CallSnapshot {
        &self.calls[call.index()]
    }

    /// Latency histogram for one call type, or across all calls
    pub fn latency(&self, call: Option<CallType>) -> &Histogram<u64> {
        match call {
            Some(call) => &self.call(call).latency,
            None => &self.overall_latency,
        }
    }

    pub fn latency_ms(&self, call: Option<CallType>, stat: LatencyStat) -> Option<f64> {
        latency_stat_ms(self.latency(call), stat)
    }
}
