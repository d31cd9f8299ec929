use anyhow::Result;
use metricwatch_alert::executor::MetricThresholdExecutor;
use metricwatch_runner::config::RunnerConfig;
use metricwatch_runner::run_once;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metricwatch=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/runner.example.toml".to_string());

    let config = RunnerConfig::load(&config_path)?;
    tracing::info!(rule_id = %config.rule_id, "metricwatch-runner starting");

    metricwatch_common::id::init(1, 1);
    let executor = MetricThresholdExecutor::new(config.engine.clone());

    let Some(interval_secs) = config.interval_secs else {
        run_once(&config, &executor).await?;
        return Ok(());
    };

    let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
    tracing::info!(interval_secs, "Starting evaluation loop");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = run_once(&config, &executor).await {
                    tracing::error!(rule_id = %config.rule_id, error = %e, "Rule run failed");
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}
