// Wire models for the reviewer-assignment service

pub mod pull_request;
pub mod team;

use serde::{Deserialize, Serialize};

pub use pull_request::{
    AssignmentStatsResponse, CreatePrRequest, CreatePrResponse, PullRequest, ReassignRequest,
    ReassignResponse, ReviewerStat, PullRequestStat,
};
pub use team::{Member, Team, TeamResponse};

/// Business error codes carried in `{"error": {"code": ...}}` bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TeamExists,
    PrExists,
    PrMerged,
    NotAssigned,
    NoCandidate,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    /// Extract the business error code from a raw body, if it has one
    pub fn code_from_body(body: &[u8]) -> Option<ErrorCode> {
        serde_json::from_slice::<ErrorResponse>(body)
            .ok()
            .map(|r| r.error.code)
    }
}
