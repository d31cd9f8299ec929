//! Grouped metric-threshold alert evaluation.
//!
//! One call to [`executor::MetricThresholdExecutor::execute`] is one scheduled
//! run of a rule: every criterion is evaluated against the grouped data the
//! [`MetricsBackend`] returns, the per-criterion results are AND-combined into
//! one [`metricwatch_common::types::AlertState`] per group, notifications are
//! scheduled through the host's [`AlertServices`] handle, and the next
//! [`state::RuleState`] is returned for the host to persist.

pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod filter;
pub mod messages;
pub mod missing_groups;
pub mod params;
pub mod query;
pub mod reducer;
pub mod state;


use anyhow::Result;
use async_trait::async_trait;
use context::{AlertNotification, RecoveredContext, StoredAlert};
use query::{BucketObservation, MetricQuery};
use std::collections::HashMap;

/// Data backend that runs the time-bucketed aggregation for one criterion.
///
/// The backend is asked once per criterion per run. It is responsible for
/// paging over the group combinations (`composite_size` per page) and for
/// probing the previously missing groups listed in the query.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Returns the latest bucket of the criterion's aggregation for every
    /// group, keyed by group key (`"*"` when the rule is ungrouped).
    ///
    /// # Errors
    ///
    /// Any error aborts the run; the engine does not retry.
    async fn evaluate(&self, query: &MetricQuery<'_>) -> Result<HashMap<String, BucketObservation>>;
}

/// Handle onto the rule-execution host for one run.
///
/// The host owns alert-instance lifecycle: it decides which instances were
/// active before this run and delivers the scheduled actions.
#[async_trait]
pub trait AlertServices: Send + Sync {
    /// Reports an alert instance for this run and schedules its actions.
    fn schedule(&mut self, notification: AlertNotification);

    /// Stable uuid of the alert instance with the given id, if the host has one.
    fn alert_uuid(&self, alert_id: &str) -> Option<String>;

    /// Ids of instances that were active before this run and were not
    /// scheduled during it. Called once, after all scheduling is done.
    fn recovered_alert_ids(&mut self) -> Vec<String>;

    /// Loads the last stored document of an alert instance.
    ///
    /// # Errors
    ///
    /// Failures degrade the recovered context to an empty additional context.
    async fn alert_by_uuid(&self, uuid: &str) -> Result<Option<StoredAlert>>;

    /// Attaches the context the recovered action will be rendered with.
    fn set_recovered_context(&mut self, alert_id: &str, context: RecoveredContext);
}
