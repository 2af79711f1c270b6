use serde::{Deserialize, Serialize};

// ==================================================================================================
// Request Models
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    #[serde(default, alias = "old_reviewer_id")]
    pub old_user_id: String,
}

// ==================================================================================================
// Response Models
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assigned_reviewers: Vec<String>,
}

// The service encodes an empty reviewer list as `null`
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `/pullRequest/create`. Error bodies decode to `pr: None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePrResponse {
    #[serde(default)]
    pub pr: Option<PullRequest>,
}

impl CreatePrResponse {
    /// Decode a create body leniently; anything unreadable carries no reviewers
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn into_reviewers(self) -> Vec<String> {
        self.pr.map(|pr| pr.assigned_reviewers).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerStat {
    pub user_id: String,
    pub assignments: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStat {
    pub pull_request_id: String,
    pub assignments: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentStatsResponse {
    pub by_reviewer: Vec<ReviewerStat>,
    pub by_pr: Vec<PullRequestStat>,
}
