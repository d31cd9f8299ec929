//! Local runner for metric-threshold rules.
//!
//! Evaluates one rule against a fixture backend, with rule state and alert
//! instances kept in JSON files between runs.

pub mod backend;
pub mod config;
pub mod host;

use anyhow::{Context, Result};
use backend::FixtureBackend;
use chrono::Utc;
use config::RunnerConfig;
use host::{AlertStore, LocalHost};
use metricwatch_alert::context::{AlertNotification, RecoveredContext};
use metricwatch_alert::executor::{ExecutionOptions, MetricThresholdExecutor};
use metricwatch_alert::params::RuleParams;
use metricwatch_alert::state::RuleState;
use std::path::{Path, PathBuf};

/// What one run produced.
#[derive(Debug)]
pub struct RunReport {
    pub state: RuleState,
    pub scheduled: Vec<AlertNotification>,
    pub recovered: Vec<(String, RecoveredContext)>,
}

fn load_state(path: &Path) -> Result<RuleState> {
    if !path.exists() {
        return Ok(RuleState::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).with_context(|| format!("parsing state {}", path.display()))
}

fn load_params(path: &Path) -> Result<RuleParams> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading rule params {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(RuleParams::from_json(&value)?)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes every file to a staging sibling first and only then moves them into
/// place in order, so a write failure leaves all targets untouched.
fn persist(files: &[(&Path, String)]) -> Result<()> {
    let staged: Vec<(PathBuf, &Path)> = files
        .iter()
        .map(|(path, _)| (staging_path(path), *path))
        .collect();
    let result = files
        .iter()
        .zip(&staged)
        .try_for_each(|((path, contents), (tmp, _))| {
            std::fs::write(tmp, contents)
                .with_context(|| format!("writing {}", path.display()))
        })
        .and_then(|()| {
            staged.iter().try_for_each(|(tmp, path)| {
                std::fs::rename(tmp, path)
                    .with_context(|| format!("replacing {}", path.display()))
            })
        });
    if result.is_err() {
        for (tmp, _) in &staged {
            let _ = std::fs::remove_file(tmp);
        }
    }
    result
}

/// Runs the configured rule once and persists state and alert instances.
///
/// Files are only written after a successful run. The alert store is replaced
/// before the rule state, so the state never runs ahead of the instances.
pub async fn run_once(
    config: &RunnerConfig,
    executor: &MetricThresholdExecutor,
) -> Result<RunReport> {
    let params = load_params(&config.params_path)?;
    let state = load_state(&config.state_path)?;
    let backend = FixtureBackend::load(&config.fixture_path)?;
    let mut host = LocalHost::new(AlertStore::load(&config.alerts_path)?);

    let options = ExecutionOptions {
        rule_id: config.rule_id.clone(),
        rule_tags: config.tags.clone(),
        params,
        state,
        started_at: Utc::now(),
        space_id: config.space_id.clone(),
    };
    let state = executor.execute(&backend, &mut host, options).await?;

    let scheduled = host.scheduled().to_vec();
    let recovered = host.recovered().to_vec();
    persist(&[
        (config.alerts_path.as_path(), host.into_store().to_json()?),
        (config.state_path.as_path(), serde_json::to_string_pretty(&state)?),
    ])?;

    tracing::info!(
        rule_id = %config.rule_id,
        scheduled = scheduled.len(),
        recovered = recovered.len(),
        missing_groups = state.missing_groups.len(),
        "Rule run complete"
    );

    Ok(RunReport {
        state,
        scheduled,
        recovered,
    })
}
