//! Threshold parsing and pass/fail evaluation.
//!
//! Expressions look like `http_req_duration{call:pr_create}:p(95)<300` or
//! `biz_fail_rate:rate<0.001`. Latency values are milliseconds.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::classifier::CallType;
use crate::error::{HarnessError, Result};
use crate::metrics::{LatencyStat, MetricsSnapshot};

static THRESHOLD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<metric>[a-z_]+)(?:\{(?P<tag>[a-z_]+):(?P<tag_value>[a-z_]+)\})?:(?P<agg>p\((?P<pct>[0-9]+(?:\.[0-9]+)?)\)|avg|med|min|max|rate|count)(?P<op><=|>=|==|!=|<|>)(?P<limit>[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)$",
    )
    .unwrap()
});

/// What a threshold observes
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// `http_req_duration`, optionally scoped to one call type
    Latency {
        call: Option<CallType>,
        stat: LatencyStat,
    },
    /// `biz_fail_rate`
    FailureRate,
    /// `dropped_iterations`
    DroppedIterations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparator::Lt),
            "<=" => Some(Comparator::Le),
            ">" => Some(Comparator::Gt),
            ">=" => Some(Comparator::Ge),
            "==" => Some(Comparator::Eq),
            "!=" => Some(Comparator::Ne),
            _ => None,
        }
    }

    fn holds(self, observed: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => observed < limit,
            Comparator::Le => observed <= limit,
            Comparator::Gt => observed > limit,
            Comparator::Ge => observed >= limit,
            Comparator::Eq => observed == limit,
            Comparator::Ne => observed != limit,
        }
    }
}

/// A named pass/fail condition over one aggregated SLI
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Source expression, used as the name in reports
    pub name: String,
    pub metric: Metric,
    pub comparator: Comparator,
    pub limit: f64,
}

impl Threshold {
    /// Parse a single threshold expression
    pub fn parse(expression: &str) -> Result<Self> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = |reason: &str| HarnessError::InvalidThreshold {
            expression: expression.trim().to_string(),
            reason: reason.to_string(),
        };

        let caps = THRESHOLD_PATTERN
            .captures(&compact)
            .ok_or_else(|| invalid("expected metric[{call:name}]:aggregate<op>value"))?;

        let metric_name = &caps["metric"];
        let aggregate = &caps["agg"];

        let call = match (caps.name("tag"), caps.name("tag_value")) {
            (Some(tag), Some(value)) => {
                if tag.as_str() != "call" && tag.as_str() != "name" {
                    return Err(invalid("only the 'call' tag is supported"));
                }
                let call: CallType = value.as_str().parse().map_err(|e: String| invalid(&e))?;
                Some(call)
            }
            _ => None,
        };

        let metric = match metric_name {
            "http_req_duration" => {
                let stat = match aggregate {
                    "avg" => LatencyStat::Avg,
                    "med" => LatencyStat::Med,
                    "min" => LatencyStat::Min,
                    "max" => LatencyStat::Max,
                    _ => match caps.name("pct") {
                        Some(pct) => {
                            let pct: f64 = pct
                                .as_str()
                                .parse()
                                .map_err(|_| invalid("percentile is not a number"))?;
                            if pct <= 0.0 || pct > 100.0 {
                                return Err(invalid("percentile must be in (0, 100]"));
                            }
                            LatencyStat::Percentile(pct)
                        }
                        None => {
                            return Err(invalid("http_req_duration supports p(N), avg, med, min, max"))
                        }
                    },
                };
                Metric::Latency { call, stat }
            }
            "biz_fail_rate" => {
                if aggregate != "rate" {
                    return Err(invalid("biz_fail_rate supports only 'rate'"));
                }
                if call.is_some() {
                    return Err(invalid("biz_fail_rate is aggregated over all calls"));
                }
                Metric::FailureRate
            }
            "dropped_iterations" => {
                if aggregate != "count" {
                    return Err(invalid("dropped_iterations supports only 'count'"));
                }
                if call.is_some() {
                    return Err(invalid("dropped_iterations has no call tag"));
                }
                Metric::DroppedIterations
            }
            other => return Err(invalid(&format!("unknown metric '{}'", other))),
        };

        let comparator = Comparator::parse(&caps["op"]).ok_or_else(|| invalid("unknown operator"))?;
        let limit: f64 = caps["limit"]
            .parse()
            .map_err(|_| invalid("limit is not a number"))?;

        Ok(Self {
            name: compact,
            metric,
            comparator,
            limit,
        })
    }

    /// Observed value of this threshold's metric; `None` when there is no data
    pub fn observe(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        match &self.metric {
            Metric::Latency { call, stat } => snapshot.latency_ms(*call, *stat),
            Metric::FailureRate => Some(snapshot.failure_rate()),
            Metric::DroppedIterations => Some(snapshot.dropped_iterations as f64),
        }
    }

    pub fn check(&self, observed: f64) -> bool {
        self.comparator.holds(observed, self.limit)
    }
}

/// Parse a `;`- or newline-separated threshold list
pub fn parse_thresholds(list: &str) -> Result<Vec<Threshold>> {
    list.split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Threshold::parse)
        .collect()
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub name: String,
    pub passed: bool,
    pub observed: Option<f64>,
}

/// Overall run verdict
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub results: Vec<ThresholdResult>,
}

/// Evaluate every threshold independently; the verdict is their conjunction.
/// A threshold with no observed data fails.
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &[Threshold]) -> Verdict {
    let results: Vec<ThresholdResult> = thresholds
        .iter()
        .map(|threshold| {
            let observed = threshold.observe(snapshot);
            let passed = observed.map(|value| threshold.check(value)).unwrap_or(false);
            if !passed {
                tracing::debug!(
                    threshold = %threshold.name,
                    observed = ?observed,
                    "Threshold crossed"
                );
            }
            ThresholdResult {
                name: threshold.name.clone(),
                passed,
                observed,
            }
        })
        .collect();

    Verdict {
        passed: results.iter().all(|r| r.passed),
        results,
    }
}
