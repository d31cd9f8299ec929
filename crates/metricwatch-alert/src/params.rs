//! Rule parameters of a metric-threshold rule.
//!
//! Parameters arrive as JSON from the host. They are decoded into a closed
//! structure and validated once, in [`RuleParams::from_json`]; the rest of
//! the engine relies on the validated shape.

use crate::error::{AlertError, Result};
use crate::evaluator::Comparator;
use metricwatch_common::types::{GroupBy, TimeUnit};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Sum,
    Cardinality,
    Rate,
    Count,
    P95,
    P99,
}

impl Aggregation {
    pub fn is_count(self) -> bool {
        self == Aggregation::Count
    }
}

/// One threshold condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    /// Metric field; not used by count aggregations.
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(alias = "aggregationType")]
    pub agg_type: Aggregation,
    pub comparator: Comparator,
    pub threshold: Vec<f64>,
    #[serde(default)]
    pub warning_comparator: Option<Comparator>,
    #[serde(default)]
    pub warning_threshold: Option<Vec<f64>>,
    #[serde(alias = "timeWindowSize")]
    pub time_size: u32,
    #[serde(alias = "timeWindowUnit")]
    pub time_unit: TimeUnit,
}

impl Criterion {
    /// Label used in reasons and action context.
    pub fn metric_label(&self) -> &str {
        if self.agg_type.is_count() {
            return "count";
        }
        self.metric.as_deref().unwrap_or("count")
    }

    fn validate(&self, index: usize) -> Result<()> {
        let invalid = |msg: String| AlertError::InvalidParams(format!("criterion {index}: {msg}"));

        if !self.agg_type.is_count() && self.metric.as_deref().map_or(true, str::is_empty) {
            return Err(invalid(format!("{:?} aggregation requires a metric", self.agg_type)));
        }
        if self.time_size == 0 {
            return Err(invalid("timeSize must be greater than 0".to_string()));
        }
        check_threshold(self.comparator, &self.threshold).map_err(invalid)?;

        match (self.warning_comparator, &self.warning_threshold) {
            (None, None) => Ok(()),
            (Some(comparator), Some(threshold)) => check_threshold(comparator, threshold)
                .map_err(|e| invalid(format!("warning {e}"))),
            _ => Err(invalid(
                "warningComparator and warningThreshold must be set together".to_string(),
            )),
        }
    }
}

fn check_threshold(comparator: Comparator, threshold: &[f64]) -> std::result::Result<(), String> {
    if threshold.len() != comparator.arity() {
        return Err(format!(
            "threshold for '{comparator}' needs {} value(s), got {}",
            comparator.arity(),
            threshold.len()
        ));
    }
    if threshold.iter().any(|t| !t.is_finite()) {
        return Err("threshold values must be finite".to_string());
    }
    Ok(())
}

/// Validated parameters of one metric-threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParams {
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    /// Compiled filter, passed to the backend as is.
    #[serde(default)]
    pub filter_query: Option<String>,
    /// Filter as typed by the user; syntax-checked when no compiled filter exists.
    #[serde(default)]
    pub filter_query_text: Option<String>,
    #[serde(default = "default_source_id")]
    pub source_id: String,
    #[serde(default)]
    pub alert_on_no_data: bool,
    /// Rules created before this flag existed alert on disappearing groups.
    #[serde(
        default = "default_alert_on_group_disappear",
        deserialize_with = "null_as_true"
    )]
    pub alert_on_group_disappear: bool,
}

fn default_source_id() -> String {
    "default".to_string()
}

fn default_alert_on_group_disappear() -> bool {
    true
}

fn null_as_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

impl RuleParams {
    /// Decodes and validates parameters.
    ///
    /// An empty criteria list is accepted here; executing such a rule fails
    /// with [`AlertError::NoCriteria`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let params: Self = serde_json::from_value(value.clone())
            .map_err(|e| AlertError::InvalidParams(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        self.criteria
            .iter()
            .enumerate()
            .try_for_each(|(i, c)| c.validate(i))
    }

    /// Grouping in effect; an empty field list means ungrouped.
    pub fn grouping(&self) -> Option<&GroupBy> {
        self.group_by.as_ref().filter(|g| !g.is_empty())
    }

    /// The user-typed filter, when it still has to be syntax-checked.
    pub fn unchecked_filter_text(&self) -> Option<&str> {
        if self.filter_query.is_some() {
            return None;
        }
        self.filter_query_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}
