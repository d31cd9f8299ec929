//! Bookkeeping of groups that had no data in a run.
//!
//! A group that vanishes from the data still has to be evaluated on the next
//! run, otherwise its alert would silently recover. The records persisted in
//! [`RuleState`] tell the backend which groups to keep probing.

use crate::state::RuleState;
use metricwatch_common::types::{GroupBy, UNGROUPED_KEY};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A group without data in the previous run.
///
/// Identity is `key`; `bucket_key` is only carried for backend correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingGroupsRecord {
    pub key: String,
    pub bucket_key: String,
}

impl PartialEq for MissingGroupsRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MissingGroupsRecord {}

impl MissingGroupsRecord {
    pub fn new(key: impl Into<String>, bucket_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            bucket_key: bucket_key.into(),
        }
    }
}

/// Older states stored bare group keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Legacy(String),
    Record(MissingGroupsRecord),
}

impl From<StoredRecord> for MissingGroupsRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored {
            StoredRecord::Legacy(key) => MissingGroupsRecord::new(key.clone(), key),
            StoredRecord::Record(record) => record,
        }
    }
}

/// Accepts both the record form and the legacy string form.
pub(crate) fn deserialize_records<'de, D>(
    deserializer: D,
) -> Result<Vec<MissingGroupsRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<Vec<StoredRecord>>::deserialize(deserializer)?;
    Ok(stored
        .unwrap_or_default()
        .into_iter()
        .map(MissingGroupsRecord::from)
        .collect())
}

/// Missing groups to seed the current run with.
///
/// Empty when disappearance alerting is off or when grouping or filter
/// differ from the run that wrote `previous`.
pub fn reconcile(
    previous: &RuleState,
    group_by: Option<&GroupBy>,
    filter_query: Option<&str>,
    alert_on_group_disappear: bool,
) -> Vec<MissingGroupsRecord> {
    if !alert_on_group_disappear {
        return Vec::new();
    }
    let group_by_is_same = previous.group_by.as_ref() == group_by;
    let filter_query_is_same = previous.filter_query.as_deref() == filter_query;
    if !(group_by_is_same && filter_query_is_same) {
        tracing::debug!(
            group_by_is_same,
            filter_query_is_same,
            dropped = previous.missing_groups.len(),
            "Rule configuration changed, resetting missing groups"
        );
        return Vec::new();
    }
    previous.missing_groups.clone()
}

/// Collects the missing groups of the current run.
#[derive(Debug, Default)]
pub struct MissingGroupsBuilder {
    records: BTreeMap<String, String>,
}

impl MissingGroupsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `group` as missing. The ungrouped key is never recorded, and
    /// the first bucket key seen for a group wins.
    pub fn add(mut self, group: &str, bucket_key: Option<&str>) -> Self {
        if group != UNGROUPED_KEY {
            self.records
                .entry(group.to_string())
                .or_insert_with(|| bucket_key.unwrap_or(group).to_string());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by group key.
    pub fn build(self) -> Vec<MissingGroupsRecord> {
        self.records
            .into_iter()
            .map(|(key, bucket_key)| MissingGroupsRecord { key, bucket_key })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(group_by: Option<GroupBy>, filter: Option<&str>) -> RuleState {
        RuleState {
            last_run_timestamp: Some(1_700_000_000_000),
            missing_groups: vec![MissingGroupsRecord::new("a", "b1")],
            group_by,
            filter_query: filter.map(str::to_string),
        }
    }

    #[test]
    fn keeps_seed_when_configuration_is_unchanged() {
        let group_by = GroupBy::Single("host.name".into());
        let prev = state(Some(group_by.clone()), Some("q"));
        let seed = reconcile(&prev, Some(&group_by), Some("q"), true);
        assert_eq!(seed, vec![MissingGroupsRecord::new("a", "b1")]);
        assert_eq!(seed[0].bucket_key, "b1");
    }

    #[test]
    fn group_by_change_resets_seed() {
        let prev = state(Some(GroupBy::Single("host.name".into())), None);
        let changed = GroupBy::Single("cloud.region".into());
        assert!(reconcile(&prev, Some(&changed), None, true).is_empty());

        let reshaped = GroupBy::Multiple(vec!["host.name".into()]);
        assert!(reconcile(&prev, Some(&reshaped), None, true).is_empty());
        assert!(reconcile(&prev, None, None, true).is_empty());
    }

    #[test]
    fn filter_change_resets_seed() {
        let group_by = GroupBy::Single("host.name".into());
        let prev = state(Some(group_by.clone()), Some("q"));
        assert!(reconcile(&prev, Some(&group_by), Some("other"), true).is_empty());
        assert!(reconcile(&prev, Some(&group_by), None, true).is_empty());
    }

    #[test]
    fn disabled_disappearance_alerting_resets_seed() {
        let group_by = GroupBy::Single("host.name".into());
        let prev = state(Some(group_by.clone()), None);
        assert!(reconcile(&prev, Some(&group_by), None, false).is_empty());
    }

    #[test]
    fn builder_dedupes_and_skips_ungrouped() {
        let records = MissingGroupsBuilder::new()
            .add("b", Some("kb"))
            .add(UNGROUPED_KEY, Some("k*"))
            .add("a", None)
            .add("b", Some("other"))
            .build();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "a");
        assert_eq!(records[0].bucket_key, "a");
        assert_eq!(records[1].bucket_key, "kb");
    }

    #[test]
    fn identity_ignores_bucket_key() {
        assert_eq!(
            MissingGroupsRecord::new("a", "x"),
            MissingGroupsRecord::new("a", "y")
        );
    }
}
