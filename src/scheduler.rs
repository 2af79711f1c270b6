//! Constant-arrival-rate scheduler.
//!
//! Starts one iteration every `1 / rate` seconds for `duration`, independent
//! of how long iterations take. Iterations run on a pool of virtual users
//! (VUs): `pre_allocated_vus` exist up front, more are created on demand up to
//! `max_vus`. A tick that finds no free VU and no room to create one is a
//! dropped iteration. After the window closes, in-flight iterations get
//! `graceful_stop` to finish and are aborted after that.

use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::metrics::MetricsCollector;

/// Identity handed to each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterationTicket {
    /// Executing virtual user, starting at 1
    pub vu: u64,
    /// The VU's own iteration counter, starting at 0
    pub vu_iteration: u64,
    /// Index among all started iterations, starting at 0
    pub global_iteration: u64,
}

/// Arrival schedule parameters
#[derive(Debug, Clone)]
pub struct ArrivalConfig {
    pub rate: f64,
    pub duration: Duration,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    pub graceful_stop: Duration,
}

/// Gap between ticks at `rate` starts per second; `None` when it does not fit
/// in a `Duration`
pub fn tick_interval(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rate)
        .ok()
        .map(|interval| interval.max(Duration::from_nanos(1)))
}

/// Ticks at `k / rate` that fall strictly inside `[0, duration)`
pub fn planned_starts(rate: f64, duration: Duration) -> u64 {
    let expected = rate * duration.as_secs_f64();
    if !(expected.is_finite() && expected > 0.0) {
        return 0;
    }
    // The tick at t=0 is always inside a non-empty window
    (expected - 1e-9).ceil().max(1.0) as u64
}

impl ArrivalConfig {
    /// Time between two scheduled starts
    pub fn interval(&self) -> Duration {
        tick_interval(self.rate).unwrap_or(Duration::MAX)
    }

    /// Number of ticks inside the window
    pub fn planned_starts(&self) -> u64 {
        planned_starts(self.rate, self.duration)
    }
}

/// What the scheduler did over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub planned: u64,
    pub started: u64,
    pub dropped: u64,
    pub completed: u64,
    pub interrupted: u64,
    pub panicked: u64,
    pub peak_in_flight: usize,
    pub vus_allocated: u64,
}

struct VirtualUser {
    id: u64,
    iterations: u64,
}

impl VirtualUser {
    fn new(id: u64) -> Self {
        Self { id, iterations: 0 }
    }

    fn next_ticket(&mut self, global_iteration: u64) -> IterationTicket {
        let ticket = IterationTicket {
            vu: self.id,
            vu_iteration: self.iterations,
            global_iteration,
        };
        self.iterations += 1;
        ticket
    }
}

pub struct ArrivalScheduler {
    config: ArrivalConfig,
    metrics: Arc<MetricsCollector>,
}

impl ArrivalScheduler {
    pub fn new(config: ArrivalConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self { config, metrics }
    }

    /// Drive `iteration` at the configured rate until the window closes and
    /// in-flight iterations have finished or been aborted.
    pub async fn run<F, Fut>(&self, iteration: F) -> SchedulerSummary
    where
        F: Fn(IterationTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let planned = self.config.planned_starts();
        let max_vus = self.config.max_vus.max(1);
        let pre_allocated = self.config.pre_allocated_vus.min(max_vus) as u64;

        let mut summary = SchedulerSummary {
            planned,
            vus_allocated: pre_allocated,
            ..Default::default()
        };
        let mut idle: VecDeque<VirtualUser> = (1..=pre_allocated).map(VirtualUser::new).collect();
        let mut next_vu_id = pre_allocated + 1;
        let mut in_flight: JoinSet<VirtualUser> = JoinSet::new();

        tracing::info!(
            rate = self.config.rate,
            duration_secs = self.config.duration.as_secs_f64(),
            planned,
            pre_allocated_vus = pre_allocated,
            max_vus,
            "Starting constant-arrival-rate scenario"
        );

        let window_start = Instant::now();
        // Ticks past the window are never used, so the period never needs to exceed it
        let period = self
            .config
            .interval()
            .min(self.config.duration)
            .max(Duration::from_nanos(1));
        let mut ticker = tokio::time::interval_at(window_start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        while summary.started + summary.dropped < planned {
            tokio::select! {
                biased;

                Some(joined) = in_flight.join_next() => {
                    self.reclaim(joined, &mut idle, &mut summary);
                }

                _ = ticker.tick() => {
                    let vu = match idle.pop_front() {
                        Some(vu) => Some(vu),
                        None if in_flight.len() < max_vus => {
                            let vu = VirtualUser::new(next_vu_id);
                            next_vu_id += 1;
                            summary.vus_allocated += 1;
                            tracing::debug!(vu = vu.id, "Allocated virtual user");
                            Some(vu)
                        }
                        None => None,
                    };

                    match vu {
                        Some(mut vu) => {
                            let ticket = vu.next_ticket(summary.started);
                            let work = iteration(ticket);
                            self.metrics.record_iteration_started();
                            in_flight.spawn(async move {
                                work.await;
                                vu
                            });
                            summary.started += 1;
                            summary.peak_in_flight = summary.peak_in_flight.max(in_flight.len());
                        }
                        None => {
                            summary.dropped += 1;
                            self.metrics.record_dropped_iteration();
                            if summary.dropped == 1 {
                                tracing::warn!(
                                    in_flight = in_flight.len(),
                                    max_vus,
                                    "All virtual users busy, dropping scheduled iterations"
                                );
                            }
                        }
                    }
                }
            }
        }

        // The grace window is measured from the end of the scenario window
        let deadline = window_start + self.config.duration + self.config.graceful_stop;
        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = in_flight.join_next().await {
                self.reclaim(joined, &mut idle, &mut summary);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                in_flight = in_flight.len(),
                grace_secs = self.config.graceful_stop.as_secs_f64(),
                "Graceful stop elapsed, aborting in-flight iterations"
            );
            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next().await {
                self.reclaim(joined, &mut idle, &mut summary);
            }
        }

        tracing::info!(
            started = summary.started,
            dropped = summary.dropped,
            completed = summary.completed,
            interrupted = summary.interrupted,
            peak_in_flight = summary.peak_in_flight,
            vus_allocated = summary.vus_allocated,
            "Scenario finished"
        );

        summary
    }

    fn reclaim(
        &self,
        joined: Result<VirtualUser, JoinError>,
        idle: &mut VecDeque<VirtualUser>,
        summary: &mut SchedulerSummary,
    ) {
        match joined {
            Ok(vu) => {
                summary.completed += 1;
                self.metrics.record_iteration_completed();
                idle.push_back(vu);
            }
            Err(e) if e.is_cancelled() => {
                summary.interrupted += 1;
                self.metrics.record_iteration_interrupted();
            }
            Err(e) => {
                // The VU is gone with its task; a fresh id replaces it on demand
                summary.panicked += 1;
                tracing::error!(error = %e, "Iteration panicked");
            }
        }
    }
}
