use crate::params::Criterion;
use crate::query::BucketObservation;
use metricwatch_common::types::TimeUnit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "notBetween", alias = "outside")]
    NotBetween,
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "gt" => Ok(Self::GreaterThan),
            ">=" | "gte" => Ok(Self::GreaterEqual),
            "<" | "lt" => Ok(Self::LessThan),
            "<=" | "lte" => Ok(Self::LessEqual),
            "between" => Ok(Self::Between),
            "notBetween" | "outside" => Ok(Self::NotBetween),
            _ => Err(format!("unknown comparator: {s}")),
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessEqual => write!(f, "<="),
            Self::Between => write!(f, "between"),
            Self::NotBetween => write!(f, "notBetween"),
        }
    }
}

impl Comparator {
    /// Number of threshold values this comparator takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Between | Self::NotBetween => 2,
            _ => 1,
        }
    }

    /// Applies the comparator. Range bounds may be given in either order;
    /// `Between` includes both bounds, `NotBetween` excludes them.
    /// A threshold of the wrong length never matches.
    pub fn check(self, value: f64, threshold: &[f64]) -> bool {
        match (self, threshold) {
            (Self::GreaterThan, [t]) => value > *t,
            (Self::GreaterEqual, [t]) => value >= *t,
            (Self::LessThan, [t]) => value < *t,
            (Self::LessEqual, [t]) => value <= *t,
            (Self::Between, [a, b]) => value >= a.min(*b) && value <= a.max(*b),
            (Self::NotBetween, [a, b]) => value < a.min(*b) || value > a.max(*b),
            _ => false,
        }
    }

    /// Translation key of the comparator's display text.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::GreaterThan => "op.above",
            Self::GreaterEqual => "op.above_or_equal",
            Self::LessThan => "op.below",
            Self::LessEqual => "op.below_or_equal",
            Self::Between => "op.between",
            Self::NotBetween => "op.not_between",
        }
    }
}

/// Outcome of one criterion for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Metric label of the criterion (`"count"` for document counts).
    pub metric: String,
    pub current_value: Option<f64>,
    pub threshold: Vec<f64>,
    pub comparator: Comparator,
    pub warning_threshold: Option<Vec<f64>>,
    pub warning_comparator: Option<Comparator>,
    pub time_size: u32,
    pub time_unit: TimeUnit,
    pub should_fire: bool,
    pub should_warn: bool,
    pub is_no_data: bool,
    pub bucket_key: Option<String>,
    pub context: Option<Map<String, Value>>,
}

/// Evaluates one criterion against the bucket observed for one group.
///
/// A bucket without a value is no-data, except for count aggregations where
/// an absent bucket means zero documents.
pub fn evaluate_condition(criterion: &Criterion, observation: &BucketObservation) -> Evaluation {
    let observed = observation.value.filter(|v| v.is_finite());
    let current_value = if criterion.agg_type.is_count() {
        Some(observed.unwrap_or(0.0))
    } else {
        observed
    };

    let (should_fire, should_warn, is_no_data) = match current_value {
        None => (false, false, true),
        Some(value) => {
            let fire = criterion.comparator.check(value, &criterion.threshold);
            let warn = !fire
                && match (criterion.warning_comparator, &criterion.warning_threshold) {
                    (Some(comparator), Some(threshold)) => comparator.check(value, threshold),
                    _ => false,
                };
            (fire, warn, false)
        }
    };

    Evaluation {
        metric: criterion.metric_label().to_string(),
        current_value,
        threshold: criterion.threshold.clone(),
        comparator: criterion.comparator,
        warning_threshold: criterion.warning_threshold.clone(),
        warning_comparator: criterion.warning_comparator,
        time_size: criterion.time_size,
        time_unit: criterion.time_unit,
        should_fire,
        should_warn,
        is_no_data,
        bucket_key: observation.bucket_key.clone(),
        context: observation.context.clone(),
    }
}
