//! Final run report: per-call summaries, threshold results and verdict.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::classifier::CallType;
use crate::fixtures::SetupSummary;
use crate::metrics::{LatencyStat, MetricsSnapshot};
use crate::scheduler::SchedulerSummary;
use crate::thresholds::{ThresholdResult, Verdict};

/// Exit status when any threshold fails
pub const THRESHOLD_FAILURE_EXIT_CODE: u8 = 99;

/// Complete report of one harness run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub setup: SetupSummary,
    pub scheduler: SchedulerSummary,
    pub calls: Vec<CallSummary>,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub failure_rate: f64,
    pub http_req_duration_p95_ms: Option<f64>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

/// Results for a single call type
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call: String,
    pub requests: u64,
    pub failures: u64,
    pub transport_errors: u64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p90_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
    pub status_counts: BTreeMap<u16, u64>,
}

impl CallSummary {
    fn from_snapshot(snapshot: &MetricsSnapshot, call: CallType) -> Self {
        let stats = snapshot.call(call);
        let stat = |s| snapshot.latency_ms(Some(call), s);
        Self {
            call: call.to_string(),
            requests: stats.requests,
            failures: stats.failures,
            transport_errors: stats.transport_errors,
            latency_p50_ms: stat(LatencyStat::Percentile(50.0)),
            latency_p90_ms: stat(LatencyStat::Percentile(90.0)),
            latency_p95_ms: stat(LatencyStat::Percentile(95.0)),
            latency_p99_ms: stat(LatencyStat::Percentile(99.0)),
            latency_max_ms: stat(LatencyStat::Max),
            status_counts: stats.status_counts.clone(),
        }
    }
}

impl RunReport {
    pub fn from_parts(
        target: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        setup: SetupSummary,
        scheduler: SchedulerSummary,
        snapshot: &MetricsSnapshot,
        verdict: Verdict,
    ) -> Self {
        let calls = CallType::ALL
            .iter()
            .map(|&call| CallSummary::from_snapshot(snapshot, call))
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            target: target.to_string(),
            started_at,
            finished_at,
            elapsed_secs: snapshot.elapsed.as_secs_f64(),
            setup,
            scheduler,
            calls,
            total_calls: snapshot.total_calls,
            failed_calls: snapshot.failed_calls,
            failure_rate: snapshot.failure_rate(),
            http_req_duration_p95_ms: snapshot.latency_ms(None, LatencyStat::Percentile(95.0)),
            thresholds: verdict.results,
            passed: verdict.passed,
        }
    }

    /// Process exit status: 0 on pass, 99 when a threshold failed
    pub fn exit_code(&self) -> u8 {
        if self.passed {
            0
        } else {
            THRESHOLD_FAILURE_EXIT_CODE
        }
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════════════════════════════╗");
        println!("║                         PR REVIEWER SERVICE LOAD TEST RESULTS                        ║");
        println!("╚══════════════════════════════════════════════════════════════════════════════════════╝");
        println!();
        println!("Run {} against {}", self.run_id, self.target);
        println!(
            "Setup: {} teams ({} created, {} existing, {} failed)",
            self.setup.teams_requested,
            self.setup.created,
            self.setup.already_existed,
            self.setup.failed
        );
        println!(
            "Iterations: {} planned, {} started, {} dropped, {} completed, {} interrupted (peak {} in flight, {} VUs)",
            self.scheduler.planned,
            self.scheduler.started,
            self.scheduler.dropped,
            self.scheduler.completed,
            self.scheduler.interrupted,
            self.scheduler.peak_in_flight,
            self.scheduler.vus_allocated
        );
        println!();
        println!("┌─────────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┐");
        println!("│ Call        │ Requests │ Failures │ Transp.  │  p50(ms) │  p90(ms) │  p95(ms) │  p99(ms) │  max(ms) │");
        println!("├─────────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┤");

        for call in &self.calls {
            println!(
                "│ {:<11} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │ {:>8} │",
                call.call,
                call.requests,
                call.failures,
                call.transport_errors,
                fmt_ms(call.latency_p50_ms),
                fmt_ms(call.latency_p90_ms),
                fmt_ms(call.latency_p95_ms),
                fmt_ms(call.latency_p99_ms),
                fmt_ms(call.latency_max_ms),
            );
        }

        println!("└─────────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┘");
        println!();

        for call in self.calls.iter().filter(|c| !c.status_counts.is_empty()) {
            let statuses: Vec<String> = call
                .status_counts
                .iter()
                .map(|(status, count)| format!("{}×{}", status, count))
                .collect();
            println!("{:<12} {}", call.call, statuses.join("  "));
        }

        println!();
        println!(
            "http_req_duration p95: {} ms   biz_fail_rate: {:.4}% ({} of {})",
            fmt_ms(self.http_req_duration_p95_ms),
            self.failure_rate * 100.0,
            self.failed_calls,
            self.total_calls
        );
        println!();

        for result in &self.thresholds {
            let observed = result
                .observed
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "no data".to_string());
            println!(
                "{} {} (observed: {})",
                if result.passed { "✓" } else { "✗" },
                result.name,
                observed
            );
        }

        println!();
        println!("Verdict: {}", if self.passed { "PASS" } else { "FAIL" });
        println!();
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn fmt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::metrics::MetricsCollector;
    use crate::thresholds::{evaluate, parse_thresholds};
    use std::time::Duration;

    fn report_for(statuses: &[(CallType, u16)], thresholds: &str) -> RunReport {
        let collector = MetricsCollector::new();
        collector.start();
        for &(call, status) in statuses {
            collector.record(&classify(call, Ok(status), Duration::from_millis(40)));
        }
        collector.stop();

        let snapshot = collector.snapshot();
        let verdict = evaluate(&snapshot, &parse_thresholds(thresholds).unwrap());
        let now = Utc::now();
        RunReport::from_parts(
            "http://localhost:8080",
            now,
            now,
            SetupSummary::default(),
            SchedulerSummary::default(),
            &snapshot,
            verdict,
        )
    }

    #[test]
    fn test_report_generation() {
        let report = report_for(
            &[
                (CallType::PrCreate, 201),
                (CallType::PrCreate, 409),
                (CallType::PrReassign, 200),
                (CallType::Stats, 500),
            ],
            "http_req_duration:p(95)<300;biz_fail_rate:rate<0.001",
        );

        assert_eq!(report.calls.len(), 4);
        let create = &report.calls[CallType::PrCreate.index()];
        assert_eq!(create.call, "pr_create");
        assert_eq!(create.requests, 2);
        assert_eq!(create.failures, 0);
        assert_eq!(create.status_counts.get(&409), Some(&1));
        assert!(create.latency_p95_ms.is_some());

        let team_add = &report.calls[CallType::TeamAdd.index()];
        assert_eq!(team_add.requests, 0);
        assert_eq!(team_add.latency_p50_ms, None);

        assert_eq!(report.total_calls, 4);
        assert_eq!(report.failed_calls, 1);
        assert!(!report.passed);
        assert_eq!(report.exit_code(), THRESHOLD_FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_passing_report_exits_zero() {
        let report = report_for(
            &[(CallType::PrCreate, 201), (CallType::Stats, 200)],
            "http_req_duration:p(95)<300;biz_fail_rate:rate<0.001",
        );
        assert!(report.passed);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_report_json() {
        let report = report_for(&[(CallType::PrCreate, 201)], "biz_fail_rate:rate<0.001");
        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();

        assert_eq!(json["passed"], true);
        assert_eq!(json["calls"][1]["call"], "pr_create");
        assert_eq!(json["calls"][1]["status_counts"]["201"], 1);
        assert_eq!(json["thresholds"][0]["name"], "biz_fail_rate:rate<0.001");
        assert!(json["run_id"].is_string());
    }
}
