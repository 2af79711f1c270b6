//! SLI accumulation: per-call latency histograms, business-failure rate and
//! iteration lifecycle counters.

pub mod collector;

pub use collector::{latency_stat_ms, CallSnapshot, LatencyStat, MetricsCollector, MetricsSnapshot};
