use crate::error::{AlertError, Result};
use crate::missing_groups::MissingGroupsRecord;
use crate::params::Criterion;
use chrono::{DateTime, Utc};
use metricwatch_common::types::GroupBy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed interval the backend aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// The criterion's look-back window ending at `end`.
    ///
    /// Fails when the window reaches before the earliest representable time.
    pub fn ending_at(end: DateTime<Utc>, criterion: &Criterion) -> Result<Self> {
        let window = criterion.time_unit.duration(criterion.time_size);
        let start = end.checked_sub_signed(window).ok_or_else(|| {
            AlertError::InvalidParams(format!(
                "window of {} {} is out of range",
                criterion.time_size,
                criterion.time_unit.label(criterion.time_size)
            ))
        })?;
        Ok(Self { start, end })
    }
}

/// Everything the backend needs to evaluate one criterion.
#[derive(Debug, Clone)]
pub struct MetricQuery<'a> {
    pub criterion_index: usize,
    pub criterion: &'a Criterion,
    pub group_by: Option<&'a GroupBy>,
    pub filter_query: Option<&'a str>,
    pub time_range: TimeRange,
    /// Page size for paging over group combinations.
    pub composite_size: usize,
    /// Groups without data in the previous run that must still be probed.
    pub missing_groups: &'a [MissingGroupsRecord],
}

/// Latest bucket of one group as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketObservation {
    /// Aggregated value; `None` when the bucket is empty.
    #[serde(default)]
    pub value: Option<f64>,
    /// Backend correlation key of the bucket, carried into missing-group records.
    #[serde(default)]
    pub bucket_key: Option<String>,
    /// Entity fields of the group (host, cloud, container, ...).
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

impl BucketObservation {
    /// An empty bucket for a group the backend did not report.
    pub fn missing(bucket_key: &str) -> Self {
        Self {
            value: None,
            bucket_key: Some(bucket_key.to_string()),
            context: None,
        }
    }
}
