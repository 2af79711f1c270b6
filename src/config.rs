use clap::Parser;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::scheduler::{planned_starts, tick_interval};
use crate::thresholds::{parse_thresholds, Threshold};

/// Load harness for the PR reviewer-assignment service
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Target service base URL
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Iteration starts per second
    #[arg(long, env = "RATE", default_value = "5")]
    pub rate: f64,

    /// Scenario duration in seconds
    #[arg(long, env = "DURATION_SECS", default_value = "60")]
    pub duration_secs: u64,

    /// Virtual users allocated before the first tick
    #[arg(long, env = "PRE_ALLOCATED_VUS", default_value = "10")]
    pub pre_allocated_vus: usize,

    /// Maximum number of virtual users (concurrency ceiling)
    #[arg(long, env = "MAX_VUS", default_value = "20")]
    pub max_vus: usize,

    /// Grace window for in-flight iterations after the last tick, in seconds
    #[arg(long, env = "GRACEFUL_STOP_SECS", default_value = "30")]
    pub graceful_stop_secs: u64,

    /// Number of fixture teams
    #[arg(long, env = "TEAM_COUNT", default_value = "20")]
    pub team_count: usize,

    /// Members per fixture team
    #[arg(long, env = "USERS_PER_TEAM", default_value = "10")]
    pub users_per_team: usize,

    /// Concurrent team-add requests during setup
    #[arg(long, env = "SETUP_PARALLELISM", default_value = "1")]
    pub setup_parallelism: usize,

    /// Pause at the end of each iteration, in milliseconds
    #[arg(long, env = "ITERATION_PAUSE_MS", default_value = "100")]
    pub iteration_pause_ms: u64,

    /// Issue the stats query every N iterations of a virtual user
    #[arg(long, env = "STATS_EVERY", default_value = "5")]
    pub stats_every: u64,

    /// Threshold list, `;`-separated
    #[arg(
        long,
        env = "THRESHOLDS",
        default_value = "http_req_duration:p(95)<300;biz_fail_rate:rate<0.001"
    )]
    pub thresholds: String,

    /// Seed for author sampling
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub http_connect_timeout: u64,

    /// Idle connections kept per host
    #[arg(long, env = "HTTP_MAX_CONNECTIONS", default_value = "100")]
    pub http_max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Print the final report as JSON
    #[arg(long, env = "OUTPUT_JSON", default_value = "false")]
    pub output_json: bool,

    /// Start the in-process mock service and run against it
    #[arg(long, env = "STANDALONE", default_value = "false")]
    pub standalone: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Target
    pub base_url: String,

    // Arrival schedule
    pub rate: f64,
    pub duration: Duration,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    pub graceful_stop: Duration,

    // Fixtures
    pub team_count: usize,
    pub users_per_team: usize,
    pub setup_parallelism: usize,

    // Scenario
    pub iteration_pause: Duration,
    pub stats_every: u64,
    pub seed: Option<u64>,

    // SLIs
    pub thresholds: Vec<Threshold>,

    // HTTP client
    pub http_request_timeout: u64,
    pub http_connect_timeout: u64,
    pub http_max_connections: usize,

    // Output
    pub log_level: String,
    pub log_format: LogFormat,
    pub output_json: bool,
    pub standalone: bool,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    /// Build a config from already-parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let thresholds = parse_thresholds(&args.thresholds)?;

        Ok(Config {
            base_url: args.base_url,
            rate: args.rate,
            duration: Duration::from_secs(args.duration_secs),
            pre_allocated_vus: args.pre_allocated_vus,
            max_vus: args.max_vus,
            graceful_stop: Duration::from_secs(args.graceful_stop_secs),
            team_count: args.team_count,
            users_per_team: args.users_per_team,
            setup_parallelism: args.setup_parallelism,
            iteration_pause: Duration::from_millis(args.iteration_pause_ms),
            stats_every: args.stats_every,
            seed: args.seed,
            thresholds,
            http_request_timeout: args.http_timeout,
            http_connect_timeout: args.http_connect_timeout,
            http_max_connections: args.http_max_connections,
            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
            output_json: args.output_json,
            standalone: args.standalone,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(HarnessError::Config(format!(
                "RATE must be a positive number, got {}",
                self.rate
            )));
        }
        if tick_interval(self.rate).is_none() {
            return Err(HarnessError::Config(format!(
                "RATE {} is too small: the interval between starts overflows",
                self.rate
            )));
        }
        if self.duration.is_zero() {
            return Err(HarnessError::Config("DURATION_SECS must be positive".into()));
        }
        if self.max_vus == 0 {
            return Err(HarnessError::Config("MAX_VUS must be positive".into()));
        }
        if self.pre_allocated_vus > self.max_vus {
            return Err(HarnessError::Config(format!(
                "PRE_ALLOCATED_VUS ({}) must not exceed MAX_VUS ({})",
                self.pre_allocated_vus, self.max_vus
            )));
        }
        if self.team_count == 0 || self.users_per_team == 0 {
            return Err(HarnessError::Config(
                "TEAM_COUNT and USERS_PER_TEAM must be positive".into(),
            ));
        }
        if self.team_count.checked_mul(self.users_per_team).is_none() {
            return Err(HarnessError::Config(format!(
                "TEAM_COUNT ({}) × USERS_PER_TEAM ({}) overflows",
                self.team_count, self.users_per_team
            )));
        }
        if self.setup_parallelism == 0 {
            return Err(HarnessError::Config("SETUP_PARALLELISM must be positive".into()));
        }
        if self.stats_every == 0 {
            return Err(HarnessError::Config("STATS_EVERY must be positive".into()));
        }
        if self.thresholds.is_empty() {
            return Err(HarnessError::Config("THRESHOLDS must not be empty".into()));
        }
        if !self.standalone {
            reqwest::Url::parse(&self.base_url).map_err(|e| {
                HarnessError::Config(format!("BASE_URL '{}' is invalid: {}", self.base_url, e))
            })?;
        }
        Ok(())
    }

    /// Number of iteration starts the schedule plans for
    pub fn planned_iterations(&self) -> u64 {
        planned_starts(self.rate, self.duration)
    }

    /// Users created by setup
    pub fn total_users(&self) -> u64 {
        (self.team_count as u64).saturating_mul(self.users_per_team as u64)
    }
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
