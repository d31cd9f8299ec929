use crate::context::{
    additional_context, conditions_lookup, group_by_keys_for, ActionContext, AlertNotification,
    Links,
};
use crate::error::{AlertError, Result};
use crate::evaluator::{evaluate_condition, Evaluation};
use crate::filter;
use crate::messages::{build_invalid_query_reason, format_evaluation, state_message};
use crate::missing_groups::{reconcile, MissingGroupsBuilder, MissingGroupsRecord};
use crate::params::RuleParams;
use crate::query::{BucketObservation, MetricQuery, TimeRange};
use crate::reducer::{
    recovered_context, reduce_group, CriterionResults, GroupVerdict, NoDataPolicy,
};
use crate::state::RuleState;
use crate::{AlertServices, MetricsBackend};
use chrono::{DateTime, SecondsFormat, Utc};
use metricwatch_common::i18n::{normalize_locale, DEFAULT_LOCALE};
use metricwatch_common::id;
use metricwatch_common::types::{AlertState, UNGROUPED_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::Instrument;

/// Engine-wide settings, shared by every rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page size the backend uses when paging over group combinations.
    #[serde(default = "default_group_by_page_size")]
    pub group_by_page_size: usize,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Public base URL of the UI; links are omitted without it.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_group_by_page_size() -> usize {
    10_000
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_by_page_size: default_group_by_page_size(),
            locale: default_locale(),
            base_url: None,
        }
    }
}

/// Inputs of one scheduled run, supplied by the host.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub rule_id: String,
    pub rule_tags: Vec<String>,
    pub params: RuleParams,
    /// State returned by the previous run; default for the first run.
    pub state: RuleState,
    pub started_at: DateTime<Utc>,
    pub space_id: String,
}

/// Executes metric-threshold rules.
///
/// Holds only configuration, so one executor can serve any number of rules
/// and concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct MetricThresholdExecutor {
    config: EngineConfig,
}

impl MetricThresholdExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the rule once and returns the state to persist for the next run.
    ///
    /// # Errors
    ///
    /// [`AlertError::NoCriteria`] before any backend call, backend failures
    /// as [`AlertError::Backend`], and [`AlertError::MalformedGrouping`] for
    /// group keys that do not fit the group-by fields. No state is returned
    /// on error; the host keeps the previous one.
    pub async fn execute(
        &self,
        backend: &dyn MetricsBackend,
        services: &mut dyn AlertServices,
        options: ExecutionOptions,
    ) -> Result<RuleState> {
        let execution_id = id::next_execution_id();
        let span = tracing::info_span!(
            "metric_threshold",
            rule_id = %options.rule_id,
            execution_id = %execution_id
        );
        self.run(backend, services, options).instrument(span).await
    }

    async fn run(
        &self,
        backend: &dyn MetricsBackend,
        services: &mut dyn AlertServices,
        options: ExecutionOptions,
    ) -> Result<RuleState> {
        let started = Instant::now();
        let ExecutionOptions {
            rule_id: _,
            rule_tags,
            params,
            state,
            started_at,
            space_id,
        } = options;

        if params.criteria.is_empty() {
            return Err(AlertError::NoCriteria);
        }
        params.validate()?;

        let run = Run {
            config: &self.config,
            params: &params,
            rule_tags: &rule_tags,
            space_id: &space_id,
            timestamp: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            locale: normalize_locale(&self.config.locale),
        };

        if let Some(text) = params.unchecked_filter_text() {
            if let Err(e) = filter::validate(text) {
                tracing::error!(error = %e, filter = %text, "Rule filter query is malformed");
                run.schedule_invalid_query(services, text);
                return Ok(RuleState::after_run(
                    started_at,
                    Vec::new(),
                    params.group_by.clone(),
                    params.filter_query.clone(),
                ));
            }
        }

        let seed = reconcile(
            &state,
            params.group_by.as_ref(),
            params.filter_query.as_deref(),
            params.alert_on_group_disappear,
        );
        let results = self.evaluate(backend, &params, started_at, &seed).await?;

        let groups: BTreeSet<&str> = results
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect();
        let policy = NoDataPolicy {
            alert_on_no_data: params.alert_on_no_data,
            alert_on_group_disappear: params.alert_on_group_disappear,
            has_groups: !(groups.len() == 1 && groups.contains(UNGROUPED_KEY)),
        };

        let mut missing = MissingGroupsBuilder::new();
        let mut scheduled = 0usize;
        for group in &groups {
            let verdict = reduce_group(group, &results, &policy, run.locale);
            if verdict.is_no_data {
                let bucket_key = results
                    .first()
                    .and_then(|r| r.get(*group))
                    .and_then(|e| e.bucket_key.as_deref());
                missing = missing.add(group, bucket_key);
            }
            if verdict.reason.is_none() {
                continue;
            }
            let uuid = services.alert_uuid(group);
            let notification = run.active_notification(group, verdict, &results, uuid.as_deref())?;
            tracing::debug!(
                group = %group,
                action_group = %notification.action_group,
                "Scheduling alert actions"
            );
            services.schedule(notification);
            scheduled += 1;
        }

        run.set_recovered_contexts(services).await;

        tracing::debug!(
            groups = groups.len(),
            missing_groups = missing.len(),
            "Scheduled {scheduled} actions in {}ms",
            started.elapsed().as_millis()
        );

        Ok(RuleState::after_run(
            started_at,
            missing.build(),
            params.group_by.clone(),
            params.filter_query.clone(),
        ))
    }

    /// Asks the backend for every criterion, one after another.
    ///
    /// Seeded missing groups the backend did not report are added as empty
    /// buckets so that they evaluate to no data.
    async fn evaluate(
        &self,
        backend: &dyn MetricsBackend,
        params: &RuleParams,
        started_at: DateTime<Utc>,
        seed: &[MissingGroupsRecord],
    ) -> Result<Vec<CriterionResults>> {
        let ranges = params
            .criteria
            .iter()
            .map(|criterion| TimeRange::ending_at(started_at, criterion))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(params.criteria.len());
        for ((index, criterion), time_range) in params.criteria.iter().enumerate().zip(ranges) {
            let query = MetricQuery {
                criterion_index: index,
                criterion,
                group_by: params.grouping(),
                filter_query: params.filter_query.as_deref(),
                time_range,
                composite_size: self.config.group_by_page_size,
                missing_groups: seed,
            };
            let mut observations = backend
                .evaluate(&query)
                .await
                .map_err(|source| AlertError::Backend {
                    criterion: index,
                    source,
                })?;
            for record in seed {
                observations
                    .entry(record.key.clone())
                    .or_insert_with(|| BucketObservation::missing(&record.bucket_key));
            }

            tracing::debug!(
                criterion = index,
                groups = observations.len(),
                "Criterion evaluated"
            );
            results.push(
                observations
                    .iter()
                    .map(|(group, observation)| {
                        (group.clone(), evaluate_condition(criterion, observation))
                    })
                    .collect(),
            );
        }
        Ok(results)
    }
}

/// Per-run values shared by the notification builders.
struct Run<'a> {
    config: &'a EngineConfig,
    params: &'a RuleParams,
    rule_tags: &'a [String],
    space_id: &'a str,
    timestamp: String,
    locale: &'a str,
}

impl Run<'_> {
    fn links(&self, alert_uuid: Option<&str>) -> Links {
        Links::new(self.config.base_url.as_deref(), self.space_id, alert_uuid)
    }

    fn metric_lookup(&self) -> Map<String, Value> {
        conditions_lookup(
            self.params
                .criteria
                .iter()
                .map(|c| c.metric_label().to_string()),
        )
    }

    fn schedule_invalid_query(&self, services: &mut dyn AlertServices, filter_query_text: &str) {
        let reason = build_invalid_query_reason(filter_query_text, self.locale);
        let links = self.links(services.alert_uuid(UNGROUPED_KEY).as_deref());
        let context = ActionContext {
            alert_details_url: links.alert_details_url,
            alert_state: state_message(AlertState::Error, self.locale),
            group: UNGROUPED_KEY.to_string(),
            group_by_keys: None,
            metric: self.metric_lookup(),
            reason: reason.clone(),
            threshold: None,
            timestamp: self.timestamp.clone(),
            value: Value::Null,
            view_in_app_url: links.view_in_app_url,
            additional: Map::new(),
        };
        services.schedule(AlertNotification {
            id: UNGROUPED_KEY.to_string(),
            action_group: AlertState::Error.action_group(),
            reason,
            evaluation_values: Vec::new(),
            additional_context: Map::new(),
            context,
        });
    }

    fn active_notification(
        &self,
        group: &str,
        verdict: GroupVerdict,
        results: &[CriterionResults],
        alert_uuid: Option<&str>,
    ) -> Result<AlertNotification> {
        let evaluations: Vec<Option<&Evaluation>> = results.iter().map(|r| r.get(group)).collect();
        let criteria = &self.params.criteria;
        let reason = verdict.reason.unwrap_or_default();

        let threshold = conditions_lookup(evaluations.iter().zip(criteria).map(|(e, c)| match e {
            Some(e) => Value::from(format_evaluation(e, false, self.locale).threshold),
            None => Value::from(c.threshold.clone()),
        }));
        let value = conditions_lookup(evaluations.iter().zip(criteria).map(|(e, c)| match e {
            Some(e) => Value::from(format_evaluation(e, false, self.locale).current_value),
            None if c.agg_type.is_count() => Value::from(0),
            None => Value::Null,
        }));

        let bucket_context = evaluations
            .first()
            .copied()
            .flatten()
            .and_then(|e| e.context.as_ref());
        let additional = additional_context(self.params.grouping(), bucket_context, self.rule_tags);
        let links = self.links(alert_uuid);

        let context = ActionContext {
            alert_details_url: links.alert_details_url,
            alert_state: state_message(verdict.state, self.locale),
            group: group.to_string(),
            group_by_keys: Some(group_by_keys_for(self.params.grouping(), group)?),
            metric: self.metric_lookup(),
            reason: reason.clone(),
            threshold: Some(threshold),
            timestamp: self.timestamp.clone(),
            value: Value::Object(value),
            view_in_app_url: links.view_in_app_url,
            additional: additional.clone(),
        };

        Ok(AlertNotification {
            id: group.to_string(),
            action_group: verdict.state.action_group(),
            reason,
            evaluation_values: evaluations
                .iter()
                .map(|e| e.and_then(|e| e.current_value))
                .collect(),
            additional_context: additional,
            context,
        })
    }

    /// Attaches context to every instance the host reports as recovered.
    ///
    /// Failures here never fail the run: a document that cannot be loaded
    /// or a group key that does not fit the grouping leaves that part empty.
    async fn set_recovered_contexts(&self, services: &mut dyn AlertServices) {
        let recovered = services.recovered_alert_ids();
        if !recovered.is_empty() {
            tracing::debug!(count = recovered.len(), "Building recovered alert contexts");
        }

        for alert_id in recovered {
            let uuid = services.alert_uuid(&alert_id);
            let stored = match uuid.as_deref() {
                Some(uuid) => match services.alert_by_uuid(uuid).await {
                    Ok(stored) => stored,
                    Err(e) => {
                        tracing::warn!(
                            alert_id = %alert_id,
                            error = %e,
                            "Failed to load recovered alert document"
                        );
                        None
                    }
                },
                None => None,
            };
            let group_by_keys = group_by_keys_for(self.params.grouping(), &alert_id)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        alert_id = %alert_id,
                        error = %e,
                        "Recovered alert id does not fit grouping"
                    );
                    BTreeMap::new()
                });

            let context = recovered_context(
                &alert_id,
                &self.params.criteria,
                group_by_keys,
                stored.as_ref(),
                &self.timestamp,
                self.links(uuid.as_deref()),
                self.locale,
            );
            services.set_recovered_context(&alert_id, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.group_by_page_size, 10_000);
        assert_eq!(config.locale, "en");
        assert!(config.base_url.is_none());
    }
}
