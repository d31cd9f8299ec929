use crate::missing_groups::{deserialize_records, MissingGroupsRecord};
use chrono::{DateTime, Utc};
use metricwatch_common::types::GroupBy;
use serde::{Deserialize, Serialize};

/// State the host persists between runs of one rule.
///
/// The host treats it as opaque JSON. A rule that never ran has the default
/// (empty) state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleState {
    /// Epoch milliseconds of the run that produced this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_timestamp: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_records")]
    pub missing_groups: Vec<MissingGroupsRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_query: Option<String>,
}

impl RuleState {
    /// State written at the end of a run started at `started_at`.
    pub fn after_run(
        started_at: DateTime<Utc>,
        missing_groups: Vec<MissingGroupsRecord>,
        group_by: Option<GroupBy>,
        filter_query: Option<String>,
    ) -> Self {
        Self {
            last_run_timestamp: Some(started_at.timestamp_millis()),
            missing_groups,
            group_by,
            filter_query,
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run_timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}
