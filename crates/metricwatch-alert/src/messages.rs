//! Human-readable reasons attached to notifications.

use crate::evaluator::{Comparator, Evaluation};
use metricwatch_common::format::{format_value, FormatStyle};
use metricwatch_common::i18n::TRANSLATIONS;
use metricwatch_common::types::{AlertState, UNGROUPED_KEY};

/// Display strings of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedEvaluation {
    pub current_value: String,
    pub threshold: Vec<String>,
    pub comparator: Comparator,
}

/// Formats an evaluation's value and thresholds with the metric's style.
///
/// With `use_warning` the warning comparator and threshold are shown; an
/// evaluation without them falls back to the primary ones.
pub fn format_evaluation(
    evaluation: &Evaluation,
    use_warning: bool,
    locale: &str,
) -> FormattedEvaluation {
    let style = FormatStyle::for_metric(&evaluation.metric);
    let (threshold, comparator) = match (
        use_warning,
        &evaluation.warning_threshold,
        evaluation.warning_comparator,
    ) {
        (true, Some(threshold), Some(comparator)) => (threshold.as_slice(), comparator),
        _ => (evaluation.threshold.as_slice(), evaluation.comparator),
    };

    let current_value = match evaluation.current_value {
        Some(value) => format_value(value, style),
        None => TRANSLATIONS
            .get(locale, "alert.threshold.no_data_value", "[NO DATA]")
            .to_string(),
    };

    FormattedEvaluation {
        current_value,
        threshold: threshold.iter().map(|t| format_value(*t, style)).collect(),
        comparator,
    }
}

fn group_suffix(group: &str, locale: &str) -> String {
    if group == UNGROUPED_KEY {
        return String::new();
    }
    TRANSLATIONS.render(locale, "alert.threshold.for_group", " for {group}", &[("group", group)])
}

fn duration_text(evaluation: &Evaluation) -> String {
    format!(
        "{} {}",
        evaluation.time_size,
        evaluation.time_unit.label(evaluation.time_size)
    )
}

fn threshold_text(threshold: &[String], locale: &str) -> String {
    match threshold {
        [low, high] => TRANSLATIONS.render(
            locale,
            "alert.threshold.range",
            "{low} and {high}",
            &[("low", low.as_str()), ("high", high.as_str())],
        ),
        _ => threshold.join(", "),
    }
}

/// Sentence for a criterion that crossed its (warning) threshold.
///
/// # Examples
///
/// ```
/// use metricwatch_alert::evaluator::{evaluate_condition, Comparator};
/// use metricwatch_alert::messages::build_fired_reason;
/// use metricwatch_alert::params::{Aggregation, Criterion};
/// use metricwatch_alert::query::BucketObservation;
/// use metricwatch_common::types::TimeUnit;
///
/// let criterion = Criterion {
///     metric: Some("system.load.1".into()),
///     agg_type: Aggregation::Avg,
///     comparator: Comparator::GreaterThan,
///     threshold: vec![5.0],
///     warning_comparator: None,
///     warning_threshold: None,
///     time_size: 5,
///     time_unit: TimeUnit::Minutes,
/// };
/// let observation = BucketObservation { value: Some(7.0), ..Default::default() };
/// let evaluation = evaluate_condition(&criterion, &observation);
/// assert_eq!(
///     build_fired_reason(&evaluation, "web-01", false, "en"),
///     "system.load.1 is 7 in the last 5 mins for web-01. Alert when above 5."
/// );
/// ```
pub fn build_fired_reason(
    evaluation: &Evaluation,
    group: &str,
    use_warning: bool,
    locale: &str,
) -> String {
    let formatted = format_evaluation(evaluation, use_warning, locale);
    let comparator = TRANSLATIONS.get(locale, formatted.comparator.message_key(), "");
    let duration = duration_text(evaluation);
    let group = group_suffix(group, locale);
    let threshold = threshold_text(&formatted.threshold, locale);
    TRANSLATIONS.render(
        locale,
        "alert.threshold.fired",
        "{metric} is {value} in the last {duration}{group}. Alert when {comparator} {threshold}.",
        &[
            ("metric", evaluation.metric.as_str()),
            ("value", formatted.current_value.as_str()),
            ("duration", duration.as_str()),
            ("group", group.as_str()),
            ("comparator", comparator),
            ("threshold", threshold.as_str()),
        ],
    )
}

/// Sentence for a criterion that reported no data.
pub fn build_no_data_reason(evaluation: &Evaluation, group: &str, locale: &str) -> String {
    let duration = duration_text(evaluation);
    let group = group_suffix(group, locale);
    TRANSLATIONS.render(
        locale,
        "alert.threshold.no_data",
        "{metric} reported no data in the last {duration}{group}",
        &[
            ("metric", evaluation.metric.as_str()),
            ("duration", duration.as_str()),
            ("group", group.as_str()),
        ],
    )
}

pub fn build_invalid_query_reason(filter_query_text: &str, locale: &str) -> String {
    TRANSLATIONS.render(
        locale,
        "alert.threshold.invalid_query",
        "Alert is using a malformed KQL query: {query}",
        &[("query", filter_query_text)],
    )
}

/// State label shown to users in the `alertState` context field.
pub fn state_message(state: AlertState, locale: &str) -> String {
    let (key, default) = match state {
        AlertState::Ok => ("state.ok", "OK"),
        AlertState::Alert => ("state.alert", "ALERT"),
        AlertState::Warning => ("state.warning", "WARNING"),
        AlertState::NoData => ("state.no_data", "NO DATA"),
        AlertState::Error => ("state.error", "ERROR"),
    };
    TRANSLATIONS.get(locale, key, default).to_string()
}
