//! Business-outcome classification for every call the harness issues.
//!
//! Each call type has its own table of expected status codes. A status in the
//! table is either a plain success or an expected business conflict; any
//! other status, and any call that never got a response, is a hard failure.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TransportError;

/// The four calls the workload issues against the target service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    TeamAdd,
    PrCreate,
    PrReassign,
    Stats,
}

impl CallType {
    pub const ALL: [CallType; 4] = [
        CallType::TeamAdd,
        CallType::PrCreate,
        CallType::PrReassign,
        CallType::Stats,
    ];

    /// Stable index into per-call arrays
    pub fn index(self) -> usize {
        match self {
            CallType::TeamAdd => 0,
            CallType::PrCreate => 1,
            CallType::PrReassign => 2,
            CallType::Stats => 3,
        }
    }

    /// Expected-status table for this call type
    pub fn expected_statuses(self) -> &'static [(u16, OutcomeKind)] {
        match self {
            CallType::TeamAdd => TEAM_ADD_EXPECTED,
            CallType::PrCreate => PR_CREATE_EXPECTED,
            CallType::PrReassign => PR_REASSIGN_EXPECTED,
            CallType::Stats => STATS_EXPECTED,
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::TeamAdd => write!(f, "team_add"),
            CallType::PrCreate => write!(f, "pr_create"),
            CallType::PrReassign => write!(f, "pr_reassign"),
            CallType::Stats => write!(f, "stats"),
        }
    }
}

impl std::str::FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "team_add" => Ok(CallType::TeamAdd),
            "pr_create" => Ok(CallType::PrCreate),
            "pr_reassign" => Ok(CallType::PrReassign),
            "stats" | "stats_assignments" => Ok(CallType::Stats),
            _ => Err(format!("Unknown call type: {}", s)),
        }
    }
}

/// Classification of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    Success,
    ExpectedBusinessConflict,
    HardFailure,
}

// 400 here is TEAM_EXISTS, which makes setup idempotent across reruns
const TEAM_ADD_EXPECTED: &[(u16, OutcomeKind)] = &[
    (201, OutcomeKind::Success),
    (400, OutcomeKind::ExpectedBusinessConflict),
];

const PR_CREATE_EXPECTED: &[(u16, OutcomeKind)] = &[
    (201, OutcomeKind::Success),
    (409, OutcomeKind::ExpectedBusinessConflict),
    (404, OutcomeKind::ExpectedBusinessConflict),
];

const PR_REASSIGN_EXPECTED: &[(u16, OutcomeKind)] = &[
    (200, OutcomeKind::Success),
    (409, OutcomeKind::ExpectedBusinessConflict),
];

const STATS_EXPECTED: &[(u16, OutcomeKind)] = &[(200, OutcomeKind::Success)];

/// Classified result of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub call: CallType,
    pub kind: OutcomeKind,
    /// `None` when the call never received a response
    pub status: Option<u16>,
    pub latency: Duration,
}

impl CallOutcome {
    pub fn is_business_failure(&self) -> bool {
        self.kind == OutcomeKind::HardFailure
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status.is_none()
    }
}

/// Map a status code to an outcome using the call type's table
pub fn classify_status(call: CallType, status: u16) -> OutcomeKind {
    if status >= 500 {
        return OutcomeKind::HardFailure;
    }
    call.expected_statuses()
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, kind)| *kind)
        .unwrap_or(OutcomeKind::HardFailure)
}

/// Classify a finished exchange, or a transport error, into a `CallOutcome`
pub fn classify(
    call: CallType,
    response: Result<u16, &TransportError>,
    latency: Duration,
) -> CallOutcome {
    match response {
        Ok(status) => CallOutcome {
            call,
            kind: classify_status(call, status),
            status: Some(status),
            latency,
        },
        Err(_) => CallOutcome {
            call,
            kind: OutcomeKind::HardFailure,
            status: None,
            latency,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATENCY: Duration = Duration::from_millis(12);

    #[test]
    fn test_pr_create_expected_statuses() {
        assert_eq!(classify_status(CallType::PrCreate, 201), OutcomeKind::Success);
        assert_eq!(
            classify_status(CallType::PrCreate, 409),
            OutcomeKind::ExpectedBusinessConflict
        );
        assert_eq!(
            classify_status(CallType::PrCreate, 404),
            OutcomeKind::ExpectedBusinessConflict
        );
        assert_eq!(classify_status(CallType::PrCreate, 200), OutcomeKind::HardFailure);
        assert_eq!(classify_status(CallType::PrCreate, 400), OutcomeKind::HardFailure);
    }

    #[test]
    fn test_team_add_already_exists_is_expected() {
        assert_eq!(classify_status(CallType::TeamAdd, 201), OutcomeKind::Success);
        assert_eq!(
            classify_status(CallType::TeamAdd, 400),
            OutcomeKind::ExpectedBusinessConflict
        );
        assert_eq!(classify_status(CallType::TeamAdd, 409), OutcomeKind::HardFailure);
    }

    #[test]
    fn test_reassign_and_stats_tables() {
        assert_eq!(classify_status(CallType::PrReassign, 200), OutcomeKind::Success);
        assert_eq!(
            classify_status(CallType::PrReassign, 409),
            OutcomeKind::ExpectedBusinessConflict
        );
        assert_eq!(classify_status(CallType::PrReassign, 404), OutcomeKind::HardFailure);
        assert_eq!(classify_status(CallType::Stats, 200), OutcomeKind::Success);
        assert_eq!(classify_status(CallType::Stats, 204), OutcomeKind::HardFailure);
    }

    #[test]
    fn test_server_errors_are_hard_failures_for_every_call() {
        for call in CallType::ALL {
            for status in [500, 502, 503, 504, 599] {
                let outcome = classify(call, Ok(status), LATENCY);
                assert!(outcome.is_business_failure(), "{} {}", call, status);
                assert_eq!(outcome.status, Some(status));
            }
        }
    }

    #[test]
    fn test_missing_response_is_hard_failure() {
        let err = TransportError::Timeout("deadline elapsed".to_string());
        let outcome = classify(CallType::PrCreate, Err(&err), LATENCY);
        assert_eq!(outcome.kind, OutcomeKind::HardFailure);
        assert!(outcome.is_business_failure());
        assert!(outcome.is_transport_failure());
        assert_eq!(outcome.status, None);
    }

    #[test]
    fn test_expected_outcomes_are_not_business_failures() {
        for call in CallType::ALL {
            for (status, _) in call.expected_statuses() {
                let outcome = classify(call, Ok(*status), LATENCY);
                assert!(!outcome.is_business_failure(), "{} {}", call, status);
            }
        }
    }

    #[test]
    fn test_call_type_round_trip_names() {
        for call in CallType::ALL {
            assert_eq!(call.to_string().parse::<CallType>().unwrap(), call);
        }
        assert_eq!("stats_assignments".parse::<CallType>().unwrap(), CallType::Stats);
        assert!("merge".parse::<CallType>().is_err());
    }

    #[test]
    fn test_call_type_indices_are_distinct() {
        let mut seen = [false; 4];
        for call in CallType::ALL {
            assert!(!seen[call.index()]);
            seen[call.index()] = true;
        }
    }
}
