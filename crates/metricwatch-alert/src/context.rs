//! Action context handed to the host with every notification.

use crate::error::{AlertError, Result};
use metricwatch_common::types::{group_key_values, ActionGroup, GroupBy, UNGROUPED_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Group-by fields whose entity documents are attached to notifications.
pub const CONTEXT_GROUP_BY_PATTERNS: &[&str] = &[
    "cloud.*",
    "host.*",
    "orchestrator.*",
    "container.*",
    "labels.*",
    "tags",
];

const DEFAULT_SPACE_ID: &str = "default";

/// Links into the UI for one alert instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    pub alert_details_url: Option<String>,
    pub view_in_app_url: Option<String>,
}

impl Links {
    pub fn new(base_url: Option<&str>, space_id: &str, alert_uuid: Option<&str>) -> Self {
        Self {
            alert_details_url: alert_details_url(base_url, space_id, alert_uuid),
            view_in_app_url: view_in_app_url(base_url, space_id),
        }
    }
}

/// Context of an active (fired, warning or no-data) notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_details_url: Option<String>,
    pub alert_state: String,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by_keys: Option<BTreeMap<String, String>>,
    pub metric: Map<String, Value>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Map<String, Value>>,
    /// RFC 3339 start time of the run.
    pub timestamp: String,
    /// `conditionN` lookup of formatted values, `null` for the invalid-query notification.
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_in_app_url: Option<String>,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl ActionContext {
    /// The context as a flat JSON object; additional context keys win over
    /// the fixed ones.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Context of a recovered alert instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_details_url: Option<String>,
    pub alert_state: String,
    pub group: String,
    pub group_by_keys: BTreeMap<String, String>,
    pub metric: Map<String, Value>,
    pub timestamp: String,
    pub threshold: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_in_app_url: Option<String>,
    pub original_alert_state: Option<String>,
    #[serde(rename = "originalAlertStateWasALERT")]
    pub original_alert_state_was_alert: bool,
    #[serde(rename = "originalAlertStateWasWARNING")]
    pub original_alert_state_was_warning: bool,
    #[serde(rename = "originalAlertStateWasNO_DATA")]
    pub original_alert_state_was_no_data: bool,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// One alert instance reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    /// Alert instance id: the group key.
    pub id: String,
    pub action_group: ActionGroup,
    pub reason: String,
    /// Raw current value per criterion; `None` where a criterion had no value.
    pub evaluation_values: Vec<Option<f64>>,
    pub additional_context: Map<String, Value>,
    pub context: ActionContext,
}

/// Last stored document of an alert instance, as kept by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAlert {
    /// Action group id the instance was last notified under.
    #[serde(default)]
    pub action_group: Option<String>,
    /// Flattened document fields (`host.name`, `tags`, ...).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl StoredAlert {
    pub fn original_action_group(&self) -> Option<ActionGroup> {
        self.action_group.as_deref().and_then(|id| id.parse().ok())
    }
}

/// Builds a `{"condition0": .., "condition1": ..}` object, one entry per criterion.
///
/// # Examples
///
/// ```
/// use metricwatch_alert::context::conditions_lookup;
/// use serde_json::json;
///
/// let lookup = conditions_lookup(["system.load.1", "count"]);
/// assert_eq!(
///     serde_json::Value::Object(lookup),
///     json!({"condition0": "system.load.1", "condition1": "count"})
/// );
/// ```
pub fn conditions_lookup<T, I>(values: I) -> Map<String, Value>
where
    T: Into<Value>,
    I: IntoIterator<Item = T>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (format!("condition{i}"), v.into()))
        .collect()
}

/// Maps a group key back to its group-by field values.
///
/// A single-field grouping maps the whole key to that field. For a field
/// list, a key with fewer values than fields maps only the leading fields.
///
/// # Errors
///
/// [`AlertError::MalformedGrouping`] when a key has more values than the
/// field list.
pub fn group_by_keys_for(
    group_by: Option<&GroupBy>,
    group: &str,
) -> Result<BTreeMap<String, String>> {
    let Some(group_by) = group_by else {
        return Ok(BTreeMap::new());
    };
    if group == UNGROUPED_KEY {
        return Ok(BTreeMap::new());
    }
    let fields = match group_by {
        GroupBy::Single(field) => {
            return Ok(BTreeMap::from([(field.clone(), group.to_string())]));
        }
        GroupBy::Multiple(fields) => fields,
    };
    let values = group_key_values(group);
    if values.len() > fields.len() {
        return Err(AlertError::MalformedGrouping {
            group: group.to_string(),
            fields: fields.join(", "),
        });
    }
    Ok(fields
        .iter()
        .zip(values)
        .map(|(field, value)| (field.clone(), value.to_string()))
        .collect())
}

fn is_context_field(field: &str) -> bool {
    CONTEXT_GROUP_BY_PATTERNS
        .iter()
        .any(|pattern| glob_match::glob_match(pattern, field))
}

/// Whether any group-by field carries entity context.
pub fn has_additional_context(group_by: Option<&GroupBy>) -> bool {
    group_by.is_some_and(|g| g.fields().into_iter().any(is_context_field))
}

/// Additional context of a notification: the bucket's entity context when
/// grouping by an entity field, plus the rule tags.
pub fn additional_context(
    group_by: Option<&GroupBy>,
    bucket_context: Option<&Map<String, Value>>,
    rule_tags: &[String],
) -> Map<String, Value> {
    let mut context = if has_additional_context(group_by) {
        bucket_context.cloned().unwrap_or_default()
    } else {
        Map::new()
    };
    let tags = merge_tags(context.get("tags"), rule_tags);
    context.insert("tags".to_string(), Value::from(tags));
    context
}

fn merge_tags(existing: Option<&Value>, rule_tags: &[String]) -> Vec<String> {
    let existing: Vec<String> = match existing {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(tag)) => vec![tag.clone()],
        _ => Vec::new(),
    };
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + rule_tags.len());
    for tag in existing.into_iter().chain(rule_tags.iter().cloned()) {
        if !merged.contains(&tag) {
            merged.push(tag);
        }
    }
    merged
}

/// Flattens nested objects into dotted keys. Arrays are kept as values.
pub fn flatten_context(context: &Map<String, Value>) -> Map<String, Value> {
    fn walk(prefix: &str, value: &Value, out: &mut Map<String, Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (k, v) in map {
                    walk(&format!("{prefix}.{k}"), v, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    let mut out = Map::new();
    for (k, v) in context {
        walk(k, v, &mut out);
    }
    out
}

fn insert_dotted(target: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            target.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_dotted(inner, rest, value);
            }
        }
    }
}

/// Entity context recovered from a stored alert document.
pub fn context_from_stored_alert(stored: Option<&StoredAlert>) -> Map<String, Value> {
    let mut context = Map::new();
    let Some(stored) = stored else {
        return context;
    };
    for (key, value) in &stored.fields {
        if is_context_field(key) {
            insert_dotted(&mut context, key, value.clone());
        }
    }
    context
}

fn space_prefix(space_id: &str) -> String {
    if space_id.is_empty() || space_id == DEFAULT_SPACE_ID {
        String::new()
    } else {
        format!("/s/{space_id}")
    }
}

/// Link to the metrics explorer of the rule's space.
pub fn view_in_app_url(base_url: Option<&str>, space_id: &str) -> Option<String> {
    let base = base_url?.trim_end_matches('/');
    Some(format!("{base}{}/app/metrics/explorer", space_prefix(space_id)))
}

/// Link to the alert details page; needs the instance uuid.
pub fn alert_details_url(
    base_url: Option<&str>,
    space_id: &str,
    alert_uuid: Option<&str>,
) -> Option<String> {
    let base = base_url?.trim_end_matches('/');
    let uuid = alert_uuid?;
    Some(format!(
        "{base}{}/app/observability/alerts/{uuid}",
        space_prefix(space_id)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grouping(fields: &[&str]) -> GroupBy {
        GroupBy::Multiple(fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn group_by_keys_zip_fields_and_values() {
        let g = grouping(&["host.name", "cloud.region"]);
        let keys = group_by_keys_for(Some(&g), "web-01, eu-west").unwrap();
        assert_eq!(keys["host.name"], "web-01");
        assert_eq!(keys["cloud.region"], "eu-west");

        let partial = group_by_keys_for(Some(&g), "web-01").unwrap();
        assert_eq!(partial.len(), 1);

        assert!(group_by_keys_for(Some(&g), UNGROUPED_KEY).unwrap().is_empty());
        assert!(group_by_keys_for(None, "web-01").unwrap().is_empty());
    }

    #[test]
    fn single_field_keeps_whole_key() {
        let g = GroupBy::Single("service.description".into());
        let keys = group_by_keys_for(Some(&g), "web, 01").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["service.description"], "web, 01");
    }

    #[test]
    fn group_by_keys_reject_extra_values() {
        let g = grouping(&["host.name"]);
        let err = group_by_keys_for(Some(&g), "a, b").unwrap_err();
        assert!(matches!(err, AlertError::MalformedGrouping { .. }));
    }

    #[test]
    fn entity_fields_enable_additional_context() {
        assert!(has_additional_context(Some(&grouping(&["host.name"]))));
        assert!(has_additional_context(Some(&grouping(&["event.dataset", "tags"]))));
        assert!(!has_additional_context(Some(&grouping(&["event.dataset"]))));
        assert!(!has_additional_context(None));
    }

    #[test]
    fn additional_context_merges_tags_in_order() {
        let bucket = json!({"host": {"name": "web-01"}, "tags": ["prod", "web"]});
        let ctx = additional_context(
            Some(&grouping(&["host.name"])),
            bucket.as_object(),
            &["web".to_string(), "team-a".to_string()],
        );
        assert_eq!(ctx["host"]["name"], "web-01");
        assert_eq!(ctx["tags"], json!(["prod", "web", "team-a"]));

        let ctx = additional_context(
            Some(&grouping(&["event.dataset"])),
            bucket.as_object(),
            &["team-a".to_string()],
        );
        assert_eq!(Value::Object(ctx), json!({"tags": ["team-a"]}));
    }

    #[test]
    fn stored_alert_context_is_unflattened() {
        let stored = StoredAlert {
            action_group: Some("metrics.threshold.warning".into()),
            fields: json!({
                "host.name": "web-01",
                "host.os.name": "linux",
                "tags": ["prod"],
                "kibana.alert.reason": "ignored"
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let ctx = context_from_stored_alert(Some(&stored));
        assert_eq!(
            Value::Object(ctx),
            json!({"host": {"name": "web-01", "os": {"name": "linux"}}, "tags": ["prod"]})
        );
        assert_eq!(stored.original_action_group(), Some(ActionGroup::Warning));
        assert!(context_from_stored_alert(None).is_empty());
    }

    #[test]
    fn flatten_keeps_arrays() {
        let nested = json!({"host": {"name": "web-01"}, "tags": ["a"]});
        let flat = flatten_context(nested.as_object().unwrap());
        assert_eq!(Value::Object(flat), json!({"host.name": "web-01", "tags": ["a"]}));
    }

    #[test]
    fn links_include_non_default_space() {
        let base = Some("https://kb.example.com/");
        assert_eq!(
            view_in_app_url(base, "default").as_deref(),
            Some("https://kb.example.com/app/metrics/explorer")
        );
        assert_eq!(
            alert_details_url(base, "ops", Some("u-1")).as_deref(),
            Some("https://kb.example.com/s/ops/app/observability/alerts/u-1")
        );
        assert_eq!(alert_details_url(base, "ops", None), None);
        assert_eq!(view_in_app_url(None, "ops"), None);
    }

    #[test]
    fn context_map_flattens_additional_fields() {
        let ctx = ActionContext {
            alert_details_url: None,
            alert_state: "ALERT".into(),
            group: "web-01".into(),
            group_by_keys: None,
            metric: conditions_lookup(["system.load.1"]),
            reason: "r".into(),
            threshold: None,
            timestamp: "2024-01-01T00:00:00Z".into(),
            value: Value::Null,
            view_in_app_url: None,
            additional: json!({"tags": ["a"]}).as_object().cloned().unwrap(),
        };
        let map = ctx.to_map();
        assert_eq!(map["tags"], json!(["a"]));
        assert_eq!(map["value"], Value::Null);
        assert!(!map.contains_key("threshold"));
        assert_eq!(map["metric"]["condition0"], "system.load.1");
    }
}
