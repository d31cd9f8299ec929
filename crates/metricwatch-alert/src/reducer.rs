//! Combines per-criterion evaluations into one verdict per group.
//!
//! Criteria are AND-ed: a group fires only when every criterion fires, and a
//! single criterion without data puts the whole group in `NO_DATA`.

use crate::context::{
    conditions_lookup, context_from_stored_alert, Links, RecoveredContext, StoredAlert,
};
use crate::evaluator::Evaluation;
use crate::messages::{build_fired_reason, build_no_data_reason, state_message};
use crate::params::Criterion;
use metricwatch_common::types::{ActionGroup, AlertState};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Evaluations of one criterion, keyed by group.
pub type CriterionResults = HashMap<String, Evaluation>;

/// Precedence: `NO_DATA`, then `ALERT`, then `WARNING`, then `OK`.
pub fn next_state(is_no_data: bool, should_fire: bool, should_warn: bool) -> AlertState {
    if is_no_data {
        AlertState::NoData
    } else if should_fire {
        AlertState::Alert
    } else if should_warn {
        AlertState::Warning
    } else {
        AlertState::Ok
    }
}

/// Whether a `NO_DATA` verdict is worth a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoDataPolicy {
    pub alert_on_no_data: bool,
    pub alert_on_group_disappear: bool,
    /// False when the only observed group is the ungrouped key.
    pub has_groups: bool,
}

impl NoDataPolicy {
    pub fn notifies(&self) -> bool {
        self.alert_on_no_data || (self.alert_on_group_disappear && self.has_groups)
    }
}

/// Reduced outcome of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupVerdict {
    pub state: AlertState,
    pub is_no_data: bool,
    /// Set only for verdicts that must be notified.
    pub reason: Option<String>,
}

/// Reduces the evaluations of all criteria for `group`.
///
/// A criterion without a result for the group neither fires nor warns nor
/// reports no data.
pub fn reduce_group(
    group: &str,
    results: &[CriterionResults],
    policy: &NoDataPolicy,
    locale: &str,
) -> GroupVerdict {
    let evaluations: Vec<Option<&Evaluation>> = results.iter().map(|r| r.get(group)).collect();

    let is_no_data = evaluations.iter().any(|e| e.is_some_and(|e| e.is_no_data));
    let should_fire = evaluations.iter().all(|e| e.is_some_and(|e| e.should_fire));
    let should_warn = evaluations.iter().all(|e| e.is_some_and(|e| e.should_warn));
    let state = next_state(is_no_data, should_fire, should_warn);

    let reason = match state {
        AlertState::Alert | AlertState::Warning => {
            let use_warning = state == AlertState::Warning;
            Some(
                evaluations
                    .iter()
                    .flatten()
                    .map(|e| build_fired_reason(e, group, use_warning, locale))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
        AlertState::NoData if policy.notifies() => Some(
            evaluations
                .iter()
                .flatten()
                .filter(|e| e.is_no_data)
                .map(|e| build_no_data_reason(e, group, locale))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    };

    GroupVerdict {
        state,
        is_no_data,
        reason: reason.filter(|r| !r.is_empty()),
    }
}

/// Context of an instance that was active before this run and is not anymore.
///
/// `stored` is the instance's last stored document; without one the
/// original state is unknown and no entity context is attached.
pub fn recovered_context(
    group: &str,
    criteria: &[Criterion],
    group_by_keys: BTreeMap<String, String>,
    stored: Option<&StoredAlert>,
    timestamp: &str,
    links: Links,
    locale: &str,
) -> RecoveredContext {
    let original = stored
        .and_then(StoredAlert::original_action_group)
        .filter(|g| *g != ActionGroup::Recovered);

    RecoveredContext {
        alert_details_url: links.alert_details_url,
        alert_state: state_message(AlertState::Ok, locale),
        group: group.to_string(),
        group_by_keys,
        metric: conditions_lookup(criteria.iter().map(|c| c.metric_label().to_string())),
        timestamp: timestamp.to_string(),
        threshold: conditions_lookup(criteria.iter().map(|c| Value::from(c.threshold.clone()))),
        view_in_app_url: links.view_in_app_url,
        original_alert_state: original.map(|g| state_message(g.alert_state(), locale)),
        original_alert_state_was_alert: original == Some(ActionGroup::Fired),
        original_alert_state_was_warning: original == Some(ActionGroup::Warning),
        original_alert_state_was_no_data: original == Some(ActionGroup::NoData),
        additional: context_from_stored_alert(stored),
    }
}
