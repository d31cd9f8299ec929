use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert instance id used when a rule has no `groupBy` configured.
pub const UNGROUPED_KEY: &str = "*";

/// Separator between group-by field values inside a group key.
pub const GROUP_KEY_SEPARATOR: &str = ", ";

/// Per-group verdict of one rule execution.
///
/// `Error` is never produced by reduction; it only labels the synthetic
/// notification raised for an unparseable filter query.
///
/// # Examples
///
/// ```
/// use metricwatch_common::types::AlertState;
///
/// assert_eq!(AlertState::NoData.to_string(), "NO_DATA");
/// assert_eq!("warning".parse::<AlertState>().unwrap(), AlertState::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    Ok,
    Alert,
    Warning,
    NoData,
    Error,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Ok => write!(f, "OK"),
            AlertState::Alert => write!(f, "ALERT"),
            AlertState::Warning => write!(f, "WARNING"),
            AlertState::NoData => write!(f, "NO_DATA"),
            AlertState::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(AlertState::Ok),
            "ALERT" => Ok(AlertState::Alert),
            "WARNING" => Ok(AlertState::Warning),
            "NO_DATA" | "NODATA" => Ok(AlertState::NoData),
            "ERROR" => Ok(AlertState::Error),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

impl AlertState {
    /// Action group a notification in this state is scheduled under.
    ///
    /// `Error` maps to `Fired` until the host offers a dedicated error group.
    pub fn action_group(self) -> ActionGroup {
        match self {
            AlertState::Ok => ActionGroup::Recovered,
            AlertState::Alert | AlertState::Error => ActionGroup::Fired,
            AlertState::Warning => ActionGroup::Warning,
            AlertState::NoData => ActionGroup::NoData,
        }
    }
}

/// Notification category used by the host to pick delivery templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionGroup {
    #[serde(rename = "metrics.threshold.fired")]
    Fired,
    #[serde(rename = "metrics.threshold.warning")]
    Warning,
    #[serde(rename = "metrics.threshold.nodata")]
    NoData,
    #[serde(rename = "recovered")]
    Recovered,
}

impl ActionGroup {
    pub fn id(self) -> &'static str {
        match self {
            ActionGroup::Fired => "metrics.threshold.fired",
            ActionGroup::Warning => "metrics.threshold.warning",
            ActionGroup::NoData => "metrics.threshold.nodata",
            ActionGroup::Recovered => "recovered",
        }
    }

    /// The alert state an instance was in when last notified under this group.
    pub fn alert_state(self) -> AlertState {
        match self {
            ActionGroup::Fired => AlertState::Alert,
            ActionGroup::Warning => AlertState::Warning,
            ActionGroup::NoData => AlertState::NoData,
            ActionGroup::Recovered => AlertState::Ok,
        }
    }
}

impl std::fmt::Display for ActionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ActionGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics.threshold.fired" => Ok(ActionGroup::Fired),
            "metrics.threshold.warning" => Ok(ActionGroup::Warning),
            "metrics.threshold.nodata" => Ok(ActionGroup::NoData),
            "recovered" => Ok(ActionGroup::Recovered),
            _ => Err(format!("unknown action group: {s}")),
        }
    }
}

/// Unit of a criterion's look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
}

impl TimeUnit {
    pub fn seconds(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
            TimeUnit::Days => 86400,
        }
    }

    /// Window length as a [`chrono::Duration`].
    pub fn duration(self, size: u32) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds() * i64::from(size))
    }

    /// Short unit label used in reason text, pluralised by `size`.
    pub fn label(self, size: u32) -> &'static str {
        let plural = size != 1;
        match (self, plural) {
            (TimeUnit::Seconds, false) => "sec",
            (TimeUnit::Seconds, true) => "secs",
            (TimeUnit::Minutes, false) => "min",
            (TimeUnit::Minutes, true) => "mins",
            (TimeUnit::Hours, false) => "hr",
            (TimeUnit::Hours, true) => "hrs",
            (TimeUnit::Days, false) => "day",
            (TimeUnit::Days, true) => "days",
        }
    }
}

/// Configured grouping: a single field or a list of fields.
///
/// Equality is structural, so `"host.name"` and `["host.name"]` differ.
/// A change of shape counts as a configuration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupBy {
    Single(String),
    Multiple(Vec<String>),
}

impl GroupBy {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            GroupBy::Single(field) => vec![field.as_str()],
            GroupBy::Multiple(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GroupBy::Single(field) => field.is_empty(),
            GroupBy::Multiple(fields) => fields.is_empty(),
        }
    }
}

/// Build the group key for one combination of group-by values.
///
/// # Examples
///
/// ```
/// use metricwatch_common::types::{group_key, UNGROUPED_KEY};
///
/// assert_eq!(group_key(&["web-01", "eu-west"]), "web-01, eu-west");
/// assert_eq!(group_key::<&str>(&[]), UNGROUPED_KEY);
/// ```
pub fn group_key<S: AsRef<str>>(values: &[S]) -> String {
    if values.is_empty() {
        return UNGROUPED_KEY.to_string();
    }
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(GROUP_KEY_SEPARATOR)
}

/// Split a group key back into its field values.
pub fn group_key_values(key: &str) -> Vec<&str> {
    if key == UNGROUPED_KEY {
        return Vec::new();
    }
    key.split(GROUP_KEY_SEPARATOR).collect()
}

/// Format a field/value mapping into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use metricwatch_common::types::format_labels;
///
/// let mut labels = BTreeMap::new();
/// labels.insert("host.name".to_string(), "web-01".to_string());
/// labels.insert("cloud.region".to_string(), "eu-west".to_string());
/// assert_eq!(format_labels(&labels), "cloud.region=eu-west, host.name=web-01");
/// ```
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
