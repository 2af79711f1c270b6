use anyhow::Result;
use std::process::ExitCode;

use pr_loadgen::config::{Config, LogFormat};
use pr_loadgen::mock_server::{MockReviewService, MockServerConfig};
use pr_loadgen::runner::LoadTest;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init(),
    }

    tracing::info!("🚀 PR reviewer load harness starting...");

    // Keep the mock alive until the run is over
    let mut mock = None;
    if config.standalone {
        let mut server = MockReviewService::new(MockServerConfig::default());
        server.start().await?;
        config.base_url = server.url();
        tracing::info!("✅ Standalone mode, targeting in-process mock at {}", config.base_url);
        mock = Some(server);
    }

    tracing::info!(
        "Target: {} ({} it/s for {}s, {}..{} VUs)",
        config.base_url,
        config.rate,
        config.duration.as_secs(),
        config.pre_allocated_vus,
        config.max_vus
    );

    let output_json = config.output_json;
    let load_test = LoadTest::new(config)?;
    let report = load_test.run().await;

    if output_json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }

    if let Some(mut server) = mock.take() {
        server.stop();
    }

    if report.passed {
        tracing::info!("✅ All thresholds passed");
    } else {
        tracing::error!("❌ Thresholds crossed, exiting with {}", report.exit_code());
    }

    Ok(ExitCode::from(report.exit_code()))
}
