//! Per-iteration business workflow: create a PR, maybe reassign its first
//! reviewer, and query assignment stats on a fixed cadence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{classify, CallOutcome, CallType, OutcomeKind};
use crate::http_client::{Exchange, TargetClient};
use crate::metrics::MetricsCollector;
use crate::models::{CreatePrRequest, CreatePrResponse, ErrorResponse, ReassignRequest};
use crate::scheduler::IterationTicket;

pub const PR_CREATE_PATH: &str = "/pullRequest/create";
pub const PR_REASSIGN_PATH: &str = "/pullRequest/reassign";
pub const STATS_PATH: &str = "/stats/assignments";

/// Read-only state produced by setup and shared with every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioContext {
    total_users: u64,
}

impl ScenarioContext {
    pub fn new(total_users: u64) -> Self {
        Self { total_users }
    }

    pub fn total_users(&self) -> u64 {
        self.total_users
    }
}

/// PR identifier for a (virtual user, per-VU iteration) pair
pub fn pull_request_id(vu: u64, iteration: u64) -> String {
    format!("pr-{}-{}", vu, iteration)
}

/// Uniform author index in `[1, total_users]`
pub fn sample_author<R: Rng + ?Sized>(rng: &mut R, total_users: u64) -> u64 {
    rng.gen_range(1..=total_users.max(1))
}

/// The PR one iteration tries to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestAttempt {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_index: u64,
}

impl PullRequestAttempt {
    pub fn new<R: Rng + ?Sized>(
        ticket: &IterationTicket,
        context: &ScenarioContext,
        rng: &mut R,
    ) -> Self {
        Self {
            pull_request_id: pull_request_id(ticket.vu, ticket.vu_iteration),
            pull_request_name: format!("Feature {}-{}", ticket.vu, ticket.vu_iteration),
            author_index: sample_author(rng, context.total_users()),
        }
    }

    pub fn author_id(&self) -> String {
        format!("u{}", self.author_index)
    }

    pub fn to_request(&self) -> CreatePrRequest {
        CreatePrRequest {
            pull_request_id: self.pull_request_id.clone(),
            pull_request_name: self.pull_request_name.clone(),
            author_id: self.author_id(),
        }
    }
}

/// Classified create call plus the reviewers its body carried
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub outcome: CallOutcome,
    pub reviewers: Vec<String>,
}

impl CreateResult {
    /// Reviewer the reassignment step replaces, if the create assigned any
    pub fn reviewer_to_replace(&self) -> Option<&str> {
        self.reviewers.first().map(String::as_str)
    }
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationSummary {
    pub ticket: IterationTicket,
    pub pull_request_id: String,
    pub create: OutcomeKind,
    /// `None` when the create response carried no reviewers
    pub reassign: Option<OutcomeKind>,
    /// `None` off the stats cadence
    pub stats: Option<OutcomeKind>,
}

/// Executes the three-step workflow for one iteration
#[derive(Clone)]
pub struct ScenarioWorkflow {
    client: TargetClient,
    metrics: Arc<MetricsCollector>,
    context: ScenarioContext,
    seed: Option<u64>,
    stats_every: u64,
    pause: Duration,
}

impl ScenarioWorkflow {
    pub fn new(client: TargetClient, metrics: Arc<MetricsCollector>, context: ScenarioContext) -> Self {
        Self {
            client,
            metrics,
            context,
            seed: None,
            stats_every: 5,
            pause: Duration::ZERO,
        }
    }

    /// Seed author sampling; each iteration derives its own generator
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_stats_every(mut self, every: u64) -> Self {
        self.stats_every = every.max(1);
        self
    }

    /// Pause after the steps, before the virtual user is released
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn context(&self) -> &ScenarioContext {
        &self.context
    }

    fn rng_for(&self, ticket: &IterationTicket) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ticket.global_iteration)),
            None => StdRng::from_entropy(),
        }
    }

    pub fn should_query_stats(&self, ticket: &IterationTicket) -> bool {
        ticket.vu_iteration % self.stats_every == 0
    }

    /// Run one iteration. Never fails: every call ends up as a recorded outcome.
    pub async fn run_iteration(&self, ticket: IterationTicket) -> IterationSummary {
        let attempt = PullRequestAttempt::new(&ticket, &self.context, &mut self.rng_for(&ticket));

        let created = self.create(&ticket, &attempt).await;

        let reassign = match created.reviewer_to_replace() {
            Some(reviewer) => Some(
                self.reassign(&ticket, &attempt.pull_request_id, reviewer)
                    .await
                    .kind,
            ),
            None => None,
        };

        let stats = if self.should_query_stats(&ticket) {
            Some(self.stats(&ticket).await.kind)
        } else {
            None
        };

        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }

        IterationSummary {
            ticket,
            pull_request_id: attempt.pull_request_id,
            create: created.outcome.kind,
            reassign,
            stats,
        }
    }

    async fn create(&self, ticket: &IterationTicket, attempt: &PullRequestAttempt) -> CreateResult {
        let exchange = self
            .client
            .post_json(PR_CREATE_PATH, &attempt.to_request())
            .await;
        let outcome = self.settle(CallType::PrCreate, ticket, &exchange);
        let reviewers = match &exchange.response {
            Ok(response) => CreatePrResponse::from_body(&response.body).into_reviewers(),
            Err(_) => Vec::new(),
        };

        CreateResult { outcome, reviewers }
    }

    async fn reassign(&self, ticket: &IterationTicket, pull_request_id: &str, old_user_id: &str) -> CallOutcome {
        let request = ReassignRequest {
            pull_request_id: pull_request_id.to_string(),
            old_user_id: old_user_id.to_string(),
        };
        let exchange = self.client.post_json(PR_REASSIGN_PATH, &request).await;
        self.settle(CallType::PrReassign, ticket, &exchange)
    }

    async fn stats(&self, ticket: &IterationTicket) -> CallOutcome {
        let exchange = self.client.get(STATS_PATH).await;
        self.settle(CallType::Stats, ticket, &exchange)
    }

    /// Classify, record and log one exchange
    fn settle(&self, call: CallType, ticket: &IterationTicket, exchange: &Exchange) -> CallOutcome {
        let outcome = classify(call, exchange.status(), exchange.latency);
        self.metrics.record(&outcome);

        let latency_ms = exchange.latency.as_secs_f64() * 1000.0;
        match (&exchange.response, outcome.kind) {
            (Err(e), _) => tracing::debug!(
                call = %call,
                vu = ticket.vu,
                iteration = ticket.vu_iteration,
                error_kind = e.kind(),
                latency_ms,
                "Call failed without response"
            ),
            (Ok(response), OutcomeKind::ExpectedBusinessConflict) => tracing::debug!(
                call = %call,
                vu = ticket.vu,
                iteration = ticket.vu_iteration,
                status = response.status,
                code = ?ErrorResponse::code_from_body(&response.body),
                latency_ms,
                "Expected business conflict"
            ),
            (Ok(response), kind) => tracing::debug!(
                call = %call,
                vu = ticket.vu,
                iteration = ticket.vu_iteration,
                status = response.status,
                outcome = ?kind,
                latency_ms,
                "Call finished"
            ),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use proptest::prelude::*;
    use serde_json::json;

    fn ticket(vu: u64, vu_iteration: u64) -> IterationTicket {
        IterationTicket {
            vu,
            vu_iteration,
            global_iteration: vu * 1000 + vu_iteration,
        }
    }

    fn workflow(url: &str, metrics: Arc<MetricsCollector>) -> ScenarioWorkflow {
        let client = TargetClient::new(url, 10, 2, 5).unwrap();
        ScenarioWorkflow::new(client, metrics, ScenarioContext::new(200)).with_seed(Some(7))
    }

    #[test]
    fn test_pull_request_id_format() {
        assert_eq!(pull_request_id(3, 0), "pr-3-0");
        assert_eq!(pull_request_id(12, 34), "pr-12-34");
    }

    #[test]
    fn test_attempt_is_deterministic_for_a_seed() {
        let context = ScenarioContext::new(200);
        let t = ticket(2, 9);
        let a = PullRequestAttempt::new(&t, &context, &mut StdRng::seed_from_u64(99));
        let b = PullRequestAttempt::new(&t, &context, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
        assert_eq!(a.pull_request_id, "pr-2-9");
        assert_eq!(a.pull_request_name, "Feature 2-9");
        assert_eq!(a.to_request().author_id, format!("u{}", a.author_index));
    }

    #[test]
    fn test_single_user_context_always_picks_u1() {
        let context = ScenarioContext::new(1);
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..50 {
            let attempt = PullRequestAttempt::new(&ticket(1, i), &context, &mut rng);
            assert_eq!(attempt.author_id(), "u1");
        }
    }

    proptest! {
        #[test]
        fn prop_author_within_range(seed in any::<u64>(), total in 1u64..10_000) {
            let mut rng = StdRng::seed_from_u64(seed);
            let author = sample_author(&mut rng, total);
            prop_assert!(author >= 1 && author <= total);
        }

        #[test]
        fn prop_distinct_tickets_get_distinct_pr_ids(
            vu_a in 1u64..10_000, iter_a in 0u64..10_000,
            vu_b in 1u64..10_000, iter_b in 0u64..10_000,
        ) {
            prop_assume!((vu_a, iter_a) != (vu_b, iter_b));
            prop_assert_ne!(pull_request_id(vu_a, iter_a), pull_request_id(vu_b, iter_b));
        }
    }

    #[tokio::test]
    async fn test_reassigns_first_reviewer_when_present() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", PR_CREATE_PATH)
            .match_body(Matcher::PartialJson(json!({"pull_request_id": "pr-1-1"})))
            .with_status(201)
            .with_body(
                json!({"pr": {
                    "pull_request_id": "pr-1-1",
                    "pull_request_name": "Feature 1-1",
                    "author_id": "u5",
                    "status": "OPEN",
                    "assigned_reviewers": ["u6", "u8"]
                }})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let reassign = server
            .mock("POST", PR_REASSIGN_PATH)
            .match_body(Matcher::Json(json!({"pull_request_id": "pr-1-1", "old_user_id": "u6"})))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let stats = server
            .mock("GET", STATS_PATH)
            .expect(0)
            .create_async()
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let summary = workflow(&server.url(), metrics.clone())
            .run_iteration(ticket(1, 1))
            .await;

        create.assert_async().await;
        reassign.assert_async().await;
        stats.assert_async().await;
        assert_eq!(summary.create, OutcomeKind::Success);
        assert_eq!(summary.reassign, Some(OutcomeKind::Success));
        assert_eq!(summary.stats, None);
        assert_eq!(metrics.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_skips_reassign_without_reviewers() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", PR_CREATE_PATH)
            .with_status(201)
            .with_body(
                json!({"pr": {
                    "pull_request_id": "pr-1-2",
                    "pull_request_name": "Feature 1-2",
                    "author_id": "u5",
                    "status": "OPEN",
                    "assigned_reviewers": []
                }})
                .to_string(),
            )
            .create_async()
            .await;
        let reassign = server
            .mock("POST", PR_REASSIGN_PATH)
            .expect(0)
            .create_async()
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let summary = workflow(&server.url(), metrics.clone())
            .run_iteration(ticket(1, 2))
            .await;

        reassign.assert_async().await;
        assert_eq!(summary.reassign, None);
        assert_eq!(metrics.total_calls(), 1);
        assert_eq!(metrics.failed_calls(), 0);
    }

    #[tokio::test]
    async fn test_conflict_create_skips_reassign_and_is_not_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", PR_CREATE_PATH)
            .with_status(409)
            .with_body(r#"{"error":{"code":"PR_EXISTS","message":"pull_request_id already exists"}}"#)
            .create_async()
            .await;
        let reassign = server
            .mock("POST", PR_REASSIGN_PATH)
            .expect(0)
            .create_async()
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let summary = workflow(&server.url(), metrics.clone())
            .run_iteration(ticket(4, 3))
            .await;

        reassign.assert_async().await;
        assert_eq!(summary.create, OutcomeKind::ExpectedBusinessConflict);
        assert_eq!(summary.reassign, None);
        assert_eq!(metrics.failed_calls(), 0);
    }

    #[tokio::test]
    async fn test_reassign_conflict_is_expected() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", PR_CREATE_PATH)
            .with_status(201)
            .with_body(r#"{"pr":{"pull_request_id":"pr-2-1","pull_request_name":"Feature 2-1","author_id":"u1","status":"OPEN","assigned_reviewers":["u2"]}}"#)
            .create_async()
            .await;
        let _reassign = server
            .mock("POST", PR_REASSIGN_PATH)
            .with_status(409)
            .with_body(r#"{"error":{"code":"NO_CANDIDATE","message":"no active replacement candidate in team"}}"#)
            .create_async()
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let summary = workflow(&server.url(), metrics.clone())
            .run_iteration(ticket(2, 1))
            .await;

        assert_eq!(summary.reassign, Some(OutcomeKind::ExpectedBusinessConflict));
        assert_eq!(metrics.failed_calls(), 0);
    }

    #[tokio::test]
    async fn test_stats_runs_every_fifth_iteration_regardless_of_create() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", PR_CREATE_PATH)
            .with_status(500)
            .expect(11)
            .create_async()
            .await;
        let stats = server
            .mock("GET", STATS_PATH)
            .with_status(200)
            .with_body(r#"{"by_reviewer":[],"by_pr":[]}"#)
            .expect(3)
            .create_async()
            .await;

        let metrics = Arc::new(MetricsCollector::new());
        let workflow = workflow(&server.url(), metrics.clone());
        let mut with_stats = Vec::new();
        for iteration in 0..=10 {
            let summary = workflow.run_iteration(ticket(3, iteration)).await;
            assert_eq!(summary.create, OutcomeKind::HardFailure);
            assert_eq!(summary.reassign, None);
            if summary.stats.is_some() {
                with_stats.push(iteration);
            }
        }

        stats.assert_async().await;
        assert_eq!(with_stats, vec![0, 5, 10]);
        assert_eq!(metrics.failed_calls(), 11);
        assert_eq!(metrics.total_calls(), 14);
    }

    #[tokio::test]
    async fn test_custom_stats_cadence() {
        let metrics = Arc::new(MetricsCollector::new());
        let workflow = workflow("http://127.0.0.1:9", metrics).with_stats_every(3);
        assert!(workflow.should_query_stats(&ticket(1, 0)));
        assert!(!workflow.should_query_stats(&ticket(1, 1)));
        assert!(workflow.should_query_stats(&ticket(1, 6)));
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_stop_later_steps() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let metrics = Arc::new(MetricsCollector::new());
        let summary = workflow(&format!("http://127.0.0.1:{}", port), metrics.clone())
            .run_iteration(ticket(1, 0))
            .await;

        assert_eq!(summary.create, OutcomeKind::HardFailure);
        assert_eq!(summary.reassign, None);
        assert_eq!(summary.stats, Some(OutcomeKind::HardFailure));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_calls, 2);
        assert_eq!(snapshot.call(CallType::PrCreate).transport_errors, 1);
        assert_eq!(snapshot.call(CallType::Stats).transport_errors, 1);
    }
}
