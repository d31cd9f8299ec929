use metricwatch_alert::executor::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub rule_id: String,
    #[serde(default = "default_space_id")]
    pub space_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Rule parameters as JSON.
    pub params_path: PathBuf,
    /// Per-criterion bucket observations the fixture backend answers with.
    pub fixture_path: PathBuf,
    /// Rule state, read before and written after every run.
    pub state_path: PathBuf,
    /// Alert instances known to the host, read and written like the state.
    pub alerts_path: PathBuf,
    /// Re-run every this many seconds; a single run when absent.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_space_id() -> String {
    "default".to_string()
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
