//! Metrics backend answering from a JSON fixture file.
//!
//! The fixture is a list with one object per criterion, mapping group keys
//! to bucket observations:
//!
//! ```json
//! [
//!   { "web-01": { "value": 0.93, "context": { "host": { "name": "web-01" } } },
//!     "web-02": { "value": null } }
//! ]
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metricwatch_alert::query::{BucketObservation, MetricQuery};
use metricwatch_alert::MetricsBackend;
use std::collections::HashMap;
use std::path::Path;

pub struct FixtureBackend {
    criteria: Vec<HashMap<String, BucketObservation>>,
}

impl FixtureBackend {
    pub fn new(criteria: Vec<HashMap<String, BucketObservation>>) -> Self {
        Self { criteria }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let criteria = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        Ok(Self::new(criteria))
    }
}

#[async_trait]
impl MetricsBackend for FixtureBackend {
    async fn evaluate(
        &self,
        query: &MetricQuery<'_>,
    ) -> Result<HashMap<String, BucketObservation>> {
        let Some(groups) = self.criteria.get(query.criterion_index) else {
            bail!(
                "fixture has no data for criterion {}",
                query.criterion_index
            );
        };
        tracing::debug!(
            criterion = query.criterion_index,
            groups = groups.len(),
            probed = query.missing_groups.len(),
            start = %query.time_range.start,
            end = %query.time_range.end,
            "Fixture query"
        );
        Ok(groups.clone())
    }
}
