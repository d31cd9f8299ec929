//! In-process rule host: tracks alert instances between runs and logs the
//! actions the engine schedules.

use anyhow::Result;
use async_trait::async_trait;
use metricwatch_alert::context::{
    flatten_context, AlertNotification, RecoveredContext, StoredAlert,
};
use metricwatch_alert::AlertServices;
use metricwatch_common::id;
use metricwatch_common::types::format_labels;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One active alert instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInstance {
    pub uuid: String,
    pub action_group: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

/// Active alert instances keyed by alert id, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStore {
    #[serde(default)]
    pub active: BTreeMap<String, AlertInstance>,
}

impl AlertStore {
    /// Loads the store; a missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File contents `load` reads back.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Host handle for one run.
pub struct LocalHost {
    store: AlertStore,
    scheduled: Vec<AlertNotification>,
    recovered_instances: BTreeMap<String, AlertInstance>,
    recovered: Vec<(String, RecoveredContext)>,
}

impl LocalHost {
    pub fn new(store: AlertStore) -> Self {
        Self {
            store,
            scheduled: Vec::new(),
            recovered_instances: BTreeMap::new(),
            recovered: Vec::new(),
        }
    }

    pub fn scheduled(&self) -> &[AlertNotification] {
        &self.scheduled
    }

    pub fn recovered(&self) -> &[(String, RecoveredContext)] {
        &self.recovered
    }

    /// Store to persist for the next run.
    pub fn into_store(self) -> AlertStore {
        self.store
    }
}

#[async_trait]
impl AlertServices for LocalHost {
    fn schedule(&mut self, notification: AlertNotification) {
        let labels = notification
            .context
            .group_by_keys
            .as_ref()
            .map(format_labels)
            .unwrap_or_default();
        tracing::info!(
            alert_id = %notification.id,
            action_group = %notification.action_group,
            labels = %labels,
            reason = %notification.reason,
            "Alert actions scheduled"
        );

        let mut fields = flatten_context(&notification.additional_context);
        fields.insert("reason".to_string(), Value::from(notification.reason.clone()));
        let action_group = notification.action_group.id().to_string();
        self.store
            .active
            .entry(notification.id.clone())
            .and_modify(|instance| {
                instance.action_group = action_group.clone();
                instance.fields = fields.clone();
            })
            .or_insert_with(|| AlertInstance {
                uuid: id::next_execution_id(),
                action_group,
                fields,
            });
        self.scheduled.push(notification);
    }

    fn alert_uuid(&self, alert_id: &str) -> Option<String> {
        self.store
            .active
            .get(alert_id)
            .or_else(|| self.recovered_instances.get(alert_id))
            .map(|instance| instance.uuid.clone())
    }

    fn recovered_alert_ids(&mut self) -> Vec<String> {
        let scheduled: BTreeSet<&str> = self.scheduled.iter().map(|n| n.id.as_str()).collect();
        let recovered: Vec<String> = self
            .store
            .active
            .keys()
            .filter(|id| !scheduled.contains(id.as_str()))
            .cloned()
            .collect();
        for alert_id in &recovered {
            if let Some(instance) = self.store.active.remove(alert_id) {
                self.recovered_instances.insert(alert_id.clone(), instance);
            }
        }
        recovered
    }

    async fn alert_by_uuid(&self, uuid: &str) -> Result<Option<StoredAlert>> {
        Ok(self
            .store
            .active
            .values()
            .chain(self.recovered_instances.values())
            .find(|instance| instance.uuid == uuid)
            .map(|instance| StoredAlert {
                action_group: Some(instance.action_group.clone()),
                fields: instance.fields.clone(),
            }))
    }

    fn set_recovered_context(&mut self, alert_id: &str, context: RecoveredContext) {
        tracing::info!(
            alert_id = %alert_id,
            original_state = context.original_alert_state.as_deref().unwrap_or("unknown"),
            "Alert recovered"
        );
        self.recovered.push((alert_id.to_string(), context));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricwatch_alert::context::ActionContext;
    use metricwatch_common::types::ActionGroup;
    use serde_json::{json, Map};

    fn notification(id: &str, action_group: ActionGroup) -> AlertNotification {
        let additional = json!({"host": {"name": id}, "tags": ["prod"]})
            .as_object()
            .cloned()
            .unwrap();
        AlertNotification {
            id: id.to_string(),
            action_group,
            reason: format!("reason for {id}"),
            evaluation_values: vec![Some(1.0)],
            additional_context: additional.clone(),
            context: ActionContext {
                alert_details_url: None,
                alert_state: "ALERT".into(),
                group: id.to_string(),
                group_by_keys: None,
                metric: Map::new(),
                reason: format!("reason for {id}"),
                threshold: None,
                timestamp: "2024-01-01T00:00:00.000Z".into(),
                value: Value::Null,
                view_in_app_url: None,
                additional,
            },
        }
    }

    #[tokio::test]
    async fn unscheduled_instances_recover_with_their_document() {
        let mut host = LocalHost::new(AlertStore::default());
        host.schedule(notification("web-01", ActionGroup::Warning));
        host.schedule(notification("web-02", ActionGroup::Fired));
        let store = host.into_store();
        let uuid = store.active["web-01"].uuid.clone();

        let mut host = LocalHost::new(store);
        host.schedule(notification("web-02", ActionGroup::Fired));
        assert_eq!(host.recovered_alert_ids(), vec!["web-01".to_string()]);
        assert_eq!(host.alert_uuid("web-01").as_deref(), Some(uuid.as_str()));

        let stored = host.alert_by_uuid(&uuid).await.unwrap().unwrap();
        assert_eq!(stored.action_group.as_deref(), Some("metrics.threshold.warning"));
        assert_eq!(stored.fields["host.name"], "web-01");

        let store = host.into_store();
        assert_eq!(store.active.len(), 1);
        assert!(store.active.contains_key("web-02"));
    }

    #[test]
    fn store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        assert_eq!(AlertStore::load(&path).unwrap(), AlertStore::default());

        let mut host = LocalHost::new(AlertStore::default());
        host.schedule(notification("web-01", ActionGroup::NoData));
        let store = host.into_store();
        std::fs::write(&path, store.to_json().unwrap()).unwrap();
        assert_eq!(AlertStore::load(&path).unwrap(), store);
    }
}
