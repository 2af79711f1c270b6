//! In-memory stand-in for the reviewer-assignment service.
//!
//! Implements the four endpoints the workload calls with the same status
//! codes and bodies as the real service, plus optional injected latency and
//! 500 errors. Used by standalone runs and the integration tests.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::models::{
    AssignmentStatsResponse, CreatePrRequest, CreatePrResponse, ErrorCode, ErrorResponse, PullRequest,
    PullRequestStat, ReassignRequest, ReassignResponse, ReviewerStat, Team, TeamResponse,
};

/// Configuration for the mock service
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Fixed latency added to every request, in milliseconds
    pub latency_ms: u64,
    /// Share of requests answered with a bare 500 (0.0 to 1.0)
    pub error_rate: f64,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 0,
            error_rate: 0.0,
        }
    }
}

struct UserRecord {
    team_name: String,
    is_active: bool,
}

struct PullRequestRecord {
    name: String,
    author_id: String,
    reviewers: Vec<String>,
}

#[derive(Default)]
struct Store {
    /// Team name to ordered member ids
    teams: HashMap<String, Vec<String>>,
    users: HashMap<String, UserRecord>,
    pull_requests: HashMap<String, PullRequestRecord>,
}

impl Store {
    fn active_teammates(&self, team_name: &str) -> Vec<String> {
        self.teams
            .get(team_name)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| self.users.get(*id).map(|u| u.is_active).unwrap_or(false))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn to_dto(id: &str, pr: &PullRequestRecord) -> PullRequest {
        PullRequest {
            pull_request_id: id.to_string(),
            pull_request_name: pr.name.clone(),
            author_id: pr.author_id.clone(),
            status: "OPEN".to_string(),
            assigned_reviewers: pr.reviewers.clone(),
        }
    }
}

struct AppState {
    config: MockServerConfig,
    store: Mutex<Store>,
}

/// Mock reviewer-assignment service
pub struct MockReviewService {
    config: MockServerConfig,
    state: Option<Arc<AppState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockReviewService {
    /// Create a new mock service with the given configuration
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            state: None,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock service and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let state = Arc::new(AppState {
            config: self.config.clone(),
            store: Mutex::new(Store::default()),
        });
        self.state = Some(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route("/team/add", post(handle_team_add))
            .route("/pullRequest/create", post(handle_pr_create))
            .route("/pullRequest/reassign", post(handle_pr_reassign))
            .route("/stats/assignments", get(handle_stats))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::info!(port, "Mock review service listening");
        Ok(port)
    }

    /// Get the service's port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the service's URL
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of pull requests stored so far
    pub fn pull_request_count(&self) -> usize {
        self.state
            .as_ref()
            .and_then(|s| s.store.lock().ok().map(|store| store.pull_requests.len()))
            .unwrap_or(0)
    }

    /// Number of teams stored so far
    pub fn team_count(&self) -> usize {
        self.state
            .as_ref()
            .and_then(|s| s.store.lock().ok().map(|store| store.teams.len()))
            .unwrap_or(0)
    }

    /// Stop the mock service
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockReviewService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply configured latency, then maybe fail the request
async fn injected_fault(state: &AppState) -> Option<Response> {
    if state.config.latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(state.config.latency_ms)).await;
    }
    if state.config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < state.config.error_rate {
        return Some(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }
    None
}

fn business_error(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (status, Json(body)).into_response()
}

fn internal_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// POST /team/add
async fn handle_team_add(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if let Some(fault) = injected_fault(&state).await {
        return fault;
    }
    let team: Team = match serde_json::from_slice(&body) {
        Ok(team) => team,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let Ok(mut store) = state.store.lock() else {
        return internal_error();
    };
    if store.teams.contains_key(&team.team_name) {
        return business_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::TeamExists,
            "team_name already exists",
        );
    }

    let member_ids = team.members.iter().map(|m| m.user_id.clone()).collect();
    store.teams.insert(team.team_name.clone(), member_ids);
    for member in &team.members {
        store.users.insert(
            member.user_id.clone(),
            UserRecord {
                team_name: team.team_name.clone(),
                is_active: member.is_active,
            },
        );
    }

    json_response(StatusCode::CREATED, &TeamResponse { team })
}

/// POST /pullRequest/create
async fn handle_pr_create(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if let Some(fault) = injected_fault(&state).await {
        return fault;
    }
    let request: CreatePrRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let Ok(mut store) = state.store.lock() else {
        return internal_error();
    };
    if store.pull_requests.contains_key(&request.pull_request_id) {
        return business_error(
            StatusCode::CONFLICT,
            ErrorCode::PrExists,
            "pull_request_id already exists",
        );
    }
    let Some(author) = store.users.get(&request.author_id) else {
        return business_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, "resource not found");
    };

    let candidates: Vec<String> = store
        .active_teammates(&author.team_name)
        .into_iter()
        .filter(|id| *id != request.author_id)
        .collect();
    let reviewers: Vec<String> = candidates
        .choose_multiple(&mut rand::thread_rng(), 2)
        .cloned()
        .collect();

    let record = PullRequestRecord {
        name: request.pull_request_name,
        author_id: request.author_id,
        reviewers,
    };
    let pr = Store::to_dto(&request.pull_request_id, &record);
    store.pull_requests.insert(request.pull_request_id, record);

    json_response(StatusCode::CREATED, &CreatePrResponse { pr: Some(pr) })
}

/// POST /pullRequest/reassign
async fn handle_pr_reassign(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if let Some(fault) = injected_fault(&state).await {
        return fault;
    }
    let request: ReassignRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if request.pull_request_id.is_empty() || request.old_user_id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let Ok(mut store) = state.store.lock() else {
        return internal_error();
    };
    let Some(pr) = store.pull_requests.get(&request.pull_request_id) else {
        return business_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, "resource not found");
    };
    if !pr.reviewers.contains(&request.old_user_id) {
        return business_error(
            StatusCode::CONFLICT,
            ErrorCode::NotAssigned,
            "reviewer is not assigned to this PR",
        );
    }
    let Some(old_reviewer) = store.users.get(&request.old_user_id) else {
        return business_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, "resource not found");
    };

    let candidates: Vec<String> = store
        .active_teammates(&old_reviewer.team_name)
        .into_iter()
        .filter(|id| *id != pr.author_id && !pr.reviewers.contains(id))
        .collect();
    let Some(replacement) = candidates.choose(&mut rand::thread_rng()).cloned() else {
        return business_error(
            StatusCode::CONFLICT,
            ErrorCode::NoCandidate,
            "no active replacement candidate in team",
        );
    };

    let Some(pr) = store.pull_requests.get_mut(&request.pull_request_id) else {
        return internal_error();
    };
    pr.reviewers.retain(|id| *id != request.old_user_id);
    pr.reviewers.push(replacement.clone());
    let dto = Store::to_dto(&request.pull_request_id, pr);

    json_response(
        StatusCode::OK,
        &ReassignResponse {
            pr: dto,
            replaced_by: replacement,
        },
    )
}

/// GET /stats/assignments
async fn handle_stats(State(state): State<Arc<AppState>>) -> Response {
    if let Some(fault) = injected_fault(&state).await {
        return fault;
    }
    let Ok(store) = state.store.lock() else {
        return internal_error();
    };

    let mut by_reviewer: BTreeMap<&str, i64> = BTreeMap::new();
    let mut by_pr: BTreeMap<&str, i64> = BTreeMap::new();
    for (id, pr) in &store.pull_requests {
        for reviewer in &pr.reviewers {
            *by_reviewer.entry(reviewer.as_str()).or_default() += 1;
        }
        by_pr.insert(id.as_str(), pr.reviewers.len() as i64);
    }

    let response = AssignmentStatsResponse {
        by_reviewer: by_reviewer
            .into_iter()
            .map(|(user_id, assignments)| ReviewerStat {
                user_id: user_id.to_string(),
                assignments,
            })
            .collect(),
        by_pr: by_pr
            .into_iter()
            .map(|(pull_request_id, assignments)| PullRequestStat {
                pull_request_id: pull_request_id.to_string(),
                assignments,
            })
            .collect(),
    };

    json_response(StatusCode::OK, &response)
}
