use chrono::Utc;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::fixtures::FixtureProvisioner;
use crate::http_client::TargetClient;
use crate::metrics::MetricsCollector;
use crate::report::RunReport;
use crate::scenario::ScenarioWorkflow;
use crate::scheduler::{ArrivalConfig, ArrivalScheduler};
use crate::thresholds::evaluate;

/// One end-to-end harness run: setup, timed scenario, verdict
pub struct LoadTest {
    config: Config,
    client: TargetClient,
    metrics: Arc<MetricsCollector>,
}

impl LoadTest {
    pub fn new(config: Config) -> Result<Self> {
        let client = TargetClient::new(
            &config.base_url,
            config.http_max_connections,
            config.http_connect_timeout,
            config.http_request_timeout,
        )?;

        Ok(Self {
            config,
            client,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    fn arrival_config(&self) -> ArrivalConfig {
        ArrivalConfig {
            rate: self.config.rate,
            duration: self.config.duration,
            pre_allocated_vus: self.config.pre_allocated_vus,
            max_vus: self.config.max_vus,
            graceful_stop: self.config.graceful_stop,
        }
    }

    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        tracing::info!(target = %self.client.base_url(), "Starting load test");
        self.metrics.start();

        let provisioner = FixtureProvisioner::new(
            self.client.clone(),
            self.metrics.clone(),
            self.config.team_count,
            self.config.users_per_team,
            self.config.setup_parallelism,
        );
        let (context, setup) = provisioner.provision().await;

        let workflow = ScenarioWorkflow::new(self.client.clone(), self.metrics.clone(), context)
            .with_seed(self.config.seed)
            .with_stats_every(self.config.stats_every)
            .with_pause(self.config.iteration_pause);

        let scheduler = ArrivalScheduler::new(self.arrival_config(), self.metrics.clone());
        let scheduled = scheduler
            .run(|ticket| {
                let workflow = workflow.clone();
                async move {
                    workflow.run_iteration(ticket).await;
                }
            })
            .await;

        self.metrics.stop();
        let snapshot = self.metrics.snapshot();
        let verdict = evaluate(&snapshot, &self.config.thresholds);

        tracing::info!(
            total_calls = snapshot.total_calls,
            failed_calls = snapshot.failed_calls,
            passed = verdict.passed,
            "Load test finished"
        );

        RunReport::from_parts(
            self.client.base_url(),
            started_at,
            Utc::now(),
            setup,
            scheduled,
            &snapshot,
            verdict,
        )
    }
}
