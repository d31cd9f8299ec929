#![allow(dead_code)]

use anyhow::Result;
use metricwatch_alert::executor::MetricThresholdExecutor;
use metricwatch_runner::config::RunnerConfig;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: RunnerConfig,
    pub executor: MetricThresholdExecutor,
}

impl TestContext {
    pub fn write_fixture(&self, fixture: &Value) -> Result<()> {
        write_json(&self.config.fixture_path, fixture)
    }

    pub fn read_json(&self, path: &Path) -> Result<Value> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Runner setup for one rule with the given parameters, writing its config
/// file like an operator would.
pub fn build_test_context(params: &Value, tags: &[&str]) -> Result<TestContext> {
    metricwatch_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    write_json(&dir.join("rule.json"), params)?;

    let tags = tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
rule_id = "rule-under-test"
space_id = "ops"
tags = [{tags}]
params_path = "{params}"
fixture_path = "{fixture}"
state_path = "{state}"
alerts_path = "{alerts}"

[engine]
base_url = "https://kibana.example.com"
"#,
        params = dir.join("rule.json").display(),
        fixture = dir.join("fixture.json").display(),
        state = dir.join("state.json").display(),
        alerts = dir.join("alerts.json").display(),
    );
    let config_path = dir.join("runner.toml");
    std::fs::write(&config_path, toml)?;

    let config = RunnerConfig::load(&config_path)?;
    let executor = MetricThresholdExecutor::new(config.engine.clone());

    Ok(TestContext {
        temp_dir,
        config,
        executor,
    })
}
