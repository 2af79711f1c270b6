//! One-time setup: seeds teams and members before the timed scenario.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

use crate::classifier::{classify, CallType, OutcomeKind};
use crate::http_client::TargetClient;
use crate::metrics::MetricsCollector;
use crate::models::{ErrorResponse, Member, Team};
use crate::scenario::ScenarioContext;

pub const TEAM_ADD_PATH: &str = "/team/add";

/// Build the fixture dataset: `team_count` teams of `users_per_team` active
/// members, with user ids `u1..=uN` increasing across teams.
pub fn build_teams(team_count: usize, users_per_team: usize) -> Vec<Team> {
    let mut next_user = 1u64;
    (1..=team_count)
        .map(|t| {
            let members = (0..users_per_team)
                .map(|_| {
                    let id = next_user;
                    next_user += 1;
                    Member {
                        user_id: format!("u{}", id),
                        username: format!("user_{}", id),
                        is_active: true,
                    }
                })
                .collect();
            Team {
                team_name: format!("team_{}", t),
                members,
            }
        })
        .collect()
}

/// Per-outcome tally of the team-add calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupSummary {
    pub teams_requested: usize,
    pub created: usize,
    pub already_existed: usize,
    pub failed: usize,
}

/// Seeds the target service with fixture teams
pub struct FixtureProvisioner {
    client: TargetClient,
    metrics: Arc<MetricsCollector>,
    team_count: usize,
    users_per_team: usize,
    parallelism: usize,
}

impl FixtureProvisioner {
    pub fn new(
        client: TargetClient,
        metrics: Arc<MetricsCollector>,
        team_count: usize,
        users_per_team: usize,
        parallelism: usize,
    ) -> Self {
        Self {
            client,
            metrics,
            team_count,
            users_per_team,
            parallelism: parallelism.max(1),
        }
    }

    /// Submit every team and wait for all of them to be classified.
    ///
    /// Hard failures are recorded and logged but never abort setup; the
    /// returned context always reflects the planned dataset.
    pub async fn provision(&self) -> (ScenarioContext, SetupSummary) {
        let teams = build_teams(self.team_count, self.users_per_team);
        tracing::info!(
            teams = teams.len(),
            users_per_team = self.users_per_team,
            parallelism = self.parallelism,
            "Provisioning fixture teams"
        );

        let kinds: Vec<OutcomeKind> = stream::iter(teams)
            .map(|team| self.add_team(team))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut summary = SetupSummary {
            teams_requested: kinds.len(),
            ..Default::default()
        };
        for kind in kinds {
            match kind {
                OutcomeKind::Success => summary.created += 1,
                OutcomeKind::ExpectedBusinessConflict => summary.already_existed += 1,
                OutcomeKind::HardFailure => summary.failed += 1,
            }
        }

        if summary.failed > 0 {
            tracing::warn!(
                failed = summary.failed,
                "Setup had hard failures, continuing into the scenario"
            );
        }
        tracing::info!(
            created = summary.created,
            already_existed = summary.already_existed,
            failed = summary.failed,
            "Fixture provisioning finished"
        );

        let total_users = (self.team_count as u64).saturating_mul(self.users_per_team as u64);
        let context = ScenarioContext::new(total_users);
        (context, summary)
    }

    async fn add_team(&self, team: Team) -> OutcomeKind {
        let exchange = self.client.post_json(TEAM_ADD_PATH, &team).await;
        let outcome = classify(CallType::TeamAdd, exchange.status(), exchange.latency);
        self.metrics.record(&outcome);

        match outcome.kind {
            OutcomeKind::HardFailure => match &exchange.response {
                Ok(r) => tracing::warn!(
                    team = %team.team_name,
                    status = r.status,
                    "Team creation failed"
                ),
                Err(e) => tracing::warn!(
                    team = %team.team_name,
                    error_kind = e.kind(),
                    error = %e,
                    "Team creation failed"
                ),
            },
            OutcomeKind::ExpectedBusinessConflict => tracing::debug!(
                team = %team.team_name,
                code = ?ErrorResponse::code_from_body(exchange.body()),
                "Team already exists"
            ),
            OutcomeKind::Success => tracing::debug!(team = %team.team_name, "Team created"),
        }

        outcome.kind
    }
}
