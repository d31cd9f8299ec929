mod common;

use common::build_test_context;
use metricwatch_common::types::ActionGroup;
use metricwatch_runner::run_once;
use serde_json::json;

fn grouped_cpu_rule() -> serde_json::Value {
    json!({
        "criteria": [{
            "metric": "system.cpu.user.pct",
            "aggType": "avg",
            "comparator": ">",
            "threshold": [0.9],
            "timeSize": 5,
            "timeUnit": "m"
        }],
        "groupBy": ["host.name"]
    })
}

#[tokio::test]
async fn firing_group_is_notified_and_persisted() {
    let ctx = build_test_context(&grouped_cpu_rule(), &["team-infra"]).unwrap();
    ctx.write_fixture(&json!([{
        "web-01": {"value": 0.95, "context": {"host": {"name": "web-01"}}},
        "web-02": {"value": 0.2}
    }]))
    .unwrap();

    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();

    assert_eq!(report.scheduled.len(), 1);
    let n = &report.scheduled[0];
    assert_eq!(n.id, "web-01");
    assert_eq!(n.action_group, ActionGroup::Fired);
    assert_eq!(
        n.reason,
        "system.cpu.user.pct is 95.0% in the last 5 mins for web-01. Alert when above 90.0%."
    );
    assert_eq!(
        n.context.view_in_app_url.as_deref(),
        Some("https://kibana.example.com/s/ops/app/metrics/explorer")
    );
    assert_eq!(n.additional_context["tags"], json!(["team-infra"]));

    let state = ctx.read_json(&ctx.config.state_path).unwrap();
    assert_eq!(state["groupBy"], json!(["host.name"]));
    assert_eq!(state["missingGroups"], json!([]));

    let alerts = ctx.read_json(&ctx.config.alerts_path).unwrap();
    assert_eq!(
        alerts["active"]["web-01"]["actionGroup"],
        "metrics.threshold.fired"
    );
    assert_eq!(alerts["active"]["web-01"]["fields"]["host.name"], "web-01");
}

#[tokio::test]
async fn vanished_alerting_group_recovers() {
    let ctx = build_test_context(&grouped_cpu_rule(), &[]).unwrap();

    ctx.write_fixture(&json!([{ "web-01": {"value": 0.95, "bucketKey": "k-web-01"} }]))
        .unwrap();
    run_once(&ctx.config, &ctx.executor).await.unwrap();

    ctx.write_fixture(&json!([{ "web-02": {"value": 0.1} }])).unwrap();
    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();
    assert_eq!(report.scheduled.len(), 0);
    assert!(report.state.missing_groups.is_empty());
    // Only groups recorded as missing are probed; web-01 simply stops alerting.
    assert_eq!(report.recovered.len(), 1);
    let (id, recovered) = &report.recovered[0];
    assert_eq!(id, "web-01");
    assert!(recovered.original_alert_state_was_alert);
    assert_eq!(recovered.original_alert_state.as_deref(), Some("ALERT"));
    assert_eq!(recovered.group_by_keys["host.name"], "web-01");
    let details = recovered.alert_details_url.as_deref().unwrap();
    assert!(details.contains("/s/ops/app/observability/alerts/"));

    let alerts = ctx.read_json(&ctx.config.alerts_path).unwrap();
    assert_eq!(alerts["active"], json!({}));
}

#[tokio::test]
async fn seeded_missing_group_is_reported_until_it_returns() {
    let ctx = build_test_context(&grouped_cpu_rule(), &[]).unwrap();
    ctx.write_fixture(&json!([{
        "web-01": {"value": null, "bucketKey": "k-web-01"},
        "web-02": {"value": 0.1}
    }]))
    .unwrap();

    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();
    assert_eq!(report.scheduled.len(), 1);
    assert_eq!(report.scheduled[0].action_group, ActionGroup::NoData);
    assert_eq!(report.state.missing_groups.len(), 1);
    assert_eq!(report.state.missing_groups[0].bucket_key, "k-web-01");

    // Not reported by the backend at all: still no data thanks to the seed.
    ctx.write_fixture(&json!([{ "web-02": {"value": 0.1} }])).unwrap();
    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();
    assert_eq!(report.scheduled.len(), 1);
    assert_eq!(report.scheduled[0].id, "web-01");
    assert_eq!(
        report.scheduled[0].reason,
        "system.cpu.user.pct reported no data in the last 5 mins for web-01"
    );

    ctx.write_fixture(&json!([{ "web-01": {"value": 0.5}, "web-02": {"value": 0.1} }]))
        .unwrap();
    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();
    assert!(report.scheduled.is_empty());
    assert!(report.state.missing_groups.is_empty());
    assert_eq!(report.recovered.len(), 1);
    assert!(report.recovered[0].1.original_alert_state_was_no_data);
}

#[tokio::test]
async fn failed_run_leaves_previous_files_untouched() {
    let mut rule = grouped_cpu_rule();
    let second = rule["criteria"][0].clone();
    rule["criteria"].as_array_mut().unwrap().push(second);
    let ctx = build_test_context(&rule, &[]).unwrap();
    ctx.write_fixture(&json!([{ "web-01": {"value": 0.95} }])).unwrap();

    let err = run_once(&ctx.config, &ctx.executor).await.unwrap_err();
    assert!(err.to_string().contains("criterion 1"), "{err}");
    assert!(!ctx.config.state_path.exists());
    assert!(!ctx.config.alerts_path.exists());
}

#[tokio::test]
async fn failed_write_persists_neither_file() {
    let ctx = build_test_context(&grouped_cpu_rule(), &[]).unwrap();
    ctx.write_fixture(&json!([{ "web-01": {"value": 0.95} }])).unwrap();
    let dir = ctx.temp_dir.path();
    std::fs::create_dir(dir.join("state.json.tmp")).unwrap();

    assert!(run_once(&ctx.config, &ctx.executor).await.is_err());
    assert!(!ctx.config.state_path.exists());
    assert!(!ctx.config.alerts_path.exists());
    assert!(!dir.join("alerts.json.tmp").exists());

    std::fs::remove_dir(dir.join("state.json.tmp")).unwrap();
    let report = run_once(&ctx.config, &ctx.executor).await.unwrap();
    assert_eq!(report.scheduled.len(), 1);
    assert!(ctx.config.state_path.exists());
    assert!(ctx.config.alerts_path.exists());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(metricwatch_runner::config::RunnerConfig::load(dir.path().join("nope.toml")).is_err());
}
