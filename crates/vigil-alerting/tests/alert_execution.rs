//! Scheduled alert runs: evaluation, action dispatch and failure handling.

mod common;

use chrono::{Duration, Utc};
use common::{threshold_alert, FirstHost, Harness, HarnessOptions};
use serde_json::json;
use std::sync::Arc;
use vigil_alerting::memory::TaskRunOutcome;
use vigil_alerting::routes::HttpMethod;
use vigil_alerting::services::{SavedObjectsRepository, TaskManager, TaskStatus};
use vigil_alerting::{AlertType, AlertingError, CreateAlertData, Interval, UpdateAlertData};
use vigil_test_utils::assert_err;

#[tokio::test]
async fn test_fired_instance_dispatches_templated_action() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1"])).await.unwrap();

    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);

    let executed = harness.actions.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].action_id, "pager");
    assert_eq!(executed[0].params, json!({ "message": "cpu high host-1 90" }));
    assert_eq!(executed[0].space_id, "default");
    assert_eq!(executed[0].base_path, "");
    assert!(executed[0].api_key.is_some());

    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert_eq!(state.alert_type_state, json!({ "runs": 1 }));
    assert!(state.alert_instances["host-1"].meta.last_scheduled_actions.is_some());
    assert!(state.previous_started_at.is_some());
}

#[tokio::test]
async fn test_state_carries_over_between_runs() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&[])).await.unwrap();

    harness.run(&alert).await;
    harness.run(&alert).await;

    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert_eq!(state.alert_type_state, json!({ "runs": 2 }));
    assert!(state.alert_instances.is_empty());
    assert_eq!(harness.actions.count(), 0);
}

#[tokio::test]
async fn test_mute_all_evaluates_without_actions() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1"])).await.unwrap();

    client.mute_all(&alert.id).await.unwrap();
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.actions.count(), 0);

    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert!(state.alert_instances.contains_key("host-1"));

    client.unmute_all(&alert.id).await.unwrap();
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.actions.count(), 1);
}

#[tokio::test]
async fn test_muted_instance_is_skipped() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1", "host-2"])).await.unwrap();

    client.mute_instance(&alert.id, "host-1").await.unwrap();
    client.mute_instance(&alert.id, "host-1").await.unwrap();
    assert_eq!(client.get(&alert.id).await.unwrap().muted_instance_ids, vec!["host-1"]);

    harness.run(&alert).await;
    let executed = harness.actions.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].params["message"], json!("cpu high host-2 90"));

    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert!(state.alert_instances.contains_key("host-1"));

    client.unmute_instance(&alert.id, "host-1").await.unwrap();
    assert!(client.get(&alert.id).await.unwrap().muted_instance_ids.is_empty());
}

#[tokio::test]
async fn test_throttle_suppresses_repeat_actions() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let mut data = threshold_alert(&["host-1"]);
    data.throttle = Some(Interval::parse("1h").unwrap());
    let alert = client.create(data).await.unwrap();

    harness.run(&alert).await;
    harness.run(&alert).await;

    assert_eq!(harness.actions.count(), 1);
}

#[tokio::test]
async fn test_only_fired_instances_are_kept() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1", "host-2"])).await.unwrap();
    harness.run(&alert).await;

    let update: UpdateAlertData = serde_json::from_value(json!({
        "name": "cpu high",
        "interval": "1m",
        "params": { "fire": ["host-2"], "value": 95 },
        "actions": alert.actions.clone(),
    }))
    .unwrap();
    client.update(&alert.id, update).await.unwrap();
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);

    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    let mut ids: Vec<&String> = state.alert_instances.keys().collect();
    ids.sort();
    assert_eq!(ids, vec!["host-2"]);
    assert_eq!(harness.actions.executed()[2].params["message"], json!("cpu high host-2 95"));
}

#[tokio::test]
async fn test_tampered_credential_fails_run_but_keeps_task() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1"])).await.unwrap();

    // Bound attribute changed without re-encrypting the key.
    harness
        .store
        .update("alert", &alert.id, json!({ "name": "renamed behind our back" }), None)
        .await
        .unwrap();

    let outcome = harness.run(&alert).await;
    assert!(matches!(outcome, TaskRunOutcome::Failed(_)));
    assert_eq!(harness.actions.count(), 0);

    let task_id = alert.scheduled_task_id.as_deref().unwrap();
    let task = harness.tasks.get(task_id).await.unwrap();
    assert!(task.last_error.is_some());
    assert!(task.run_at > Utc::now());

    // Client operations still work and rotate the broken key away.
    client.update_api_key(&alert.id).await.unwrap();
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.actions.count(), 1);
}

#[tokio::test]
async fn test_action_failure_keeps_the_schedule() {
    let harness = Harness::new();
    harness.actions.fail_action("pager");
    let client = harness.client("/api/alert");
    let mut data = threshold_alert(&["host-1"]);
    data.interval = Interval::parse("5m").unwrap();
    let alert = client.create(data).await.unwrap();

    let outcome = harness.run(&alert).await;
    assert!(matches!(outcome, TaskRunOutcome::Failed(ref message) if message.contains("pager")));

    let task = harness
        .tasks
        .get(alert.scheduled_task_id.as_deref().unwrap())
        .await
        .unwrap();
    assert!(task.run_at > Utc::now() + Duration::minutes(4));
}

#[tokio::test]
async fn test_executor_error_fails_the_run() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let data: CreateAlertData = serde_json::from_value(json!({
        "name": "flaky",
        "alertTypeId": "broken",
        "interval": "10s"
    }))
    .unwrap();
    let alert = client.create(data).await.unwrap();

    let outcome = harness.run(&alert).await;
    assert!(matches!(outcome, TaskRunOutcome::Failed(ref message) if message.contains("condition query timed out")));
    assert!(client.get_alert_state(&alert.id).await.unwrap().unwrap().previous_started_at.is_none());
}

#[tokio::test]
async fn test_actions_link_to_the_alert_space() {
    let harness = Harness::with_options(HarnessOptions {
        server_base_path: "/kbn".to_string(),
        ..HarnessOptions::default()
    });
    let client = harness.client("/kbn/s/ops/api/alert");
    let alert = client.create(threshold_alert(&["host-1"])).await.unwrap();

    harness.run(&alert).await;

    let executed = harness.actions.executed();
    assert_eq!(executed[0].space_id, "ops");
    assert_eq!(executed[0].base_path, "/kbn/s/ops");
}

#[tokio::test]
async fn test_cluster_calls_use_the_alert_credential_and_space() {
    let harness = Harness::new();
    let client = harness.client("/s/ops/api/alert");
    let data: CreateAlertData = serde_json::from_value(json!({
        "name": "doc count",
        "alertTypeId": "count",
        "interval": "1m"
    }))
    .unwrap();
    let alert = client.create(data).await.unwrap();

    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);

    let calls = harness.cluster.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].space_id, "ops");
    assert_eq!(calls[0].namespace.as_deref(), Some("ops"));
    assert!(calls[0].authenticated);
    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert_eq!(state.alert_type_state, json!({ "count": 17 }));
}

#[tokio::test]
async fn test_disable_and_enable() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&["host-1"])).await.unwrap();
    assert_eq!(harness.api_keys.active_keys().len(), 1);

    client.disable(&alert.id).await.unwrap();
    let disabled = client.get(&alert.id).await.unwrap();
    assert!(!disabled.enabled);
    assert!(disabled.scheduled_task_id.is_none());
    assert!(harness.tasks.tasks().is_empty());
    assert!(harness.api_keys.active_keys().is_empty());
    assert!(client.get_alert_state(&alert.id).await.unwrap().is_none());

    client.enable(&alert.id).await.unwrap();
    let enabled = client.get(&alert.id).await.unwrap();
    assert!(enabled.enabled);
    assert_eq!(harness.tasks.tasks().len(), 1);
    assert_eq!(harness.run(&enabled).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.actions.count(), 1);
}

#[tokio::test]
async fn test_delete_removes_alert_task_and_key() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let alert = client.create(threshold_alert(&[])).await.unwrap();

    client.delete(&alert.id).await.unwrap();

    assert!(matches!(assert_err!(client.get(&alert.id).await), AlertingError::NotFound { .. }));
    assert!(harness.tasks.tasks().is_empty());
    assert_eq!(harness.api_keys.invalidated(), vec!["key-1".to_string()]);
}

#[tokio::test]
async fn test_create_rejects_bad_definitions() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");

    let mut unknown = threshold_alert(&[]);
    unknown.alert_type_id = "nope".to_string();
    assert_eq!(assert_err!(client.create(unknown).await).status_code(), 400);

    let mut bad_group = threshold_alert(&[]);
    bad_group.actions[0].group = "critical".to_string();
    assert_eq!(assert_err!(client.create(bad_group).await).status_code(), 400);

    assert!(harness.tasks.tasks().is_empty());
}

#[tokio::test]
async fn test_out_of_range_interval_is_rejected_at_create() {
    let harness = Harness::new();
    let mut body = serde_json::to_value(threshold_alert(&["host-1"])).unwrap();
    body["interval"] = json!("4000000000d");

    let err = assert_err!(
        harness
            .router
            .call(&harness.start, HttpMethod::Post, "/api/alert", Some("elastic"), body)
            .await
    );
    assert_eq!(err.status_code(), 400);
    assert!(harness.tasks.tasks().is_empty());
}

#[tokio::test]
async fn test_longest_interval_schedules_far_ahead() {
    let harness = Harness::new();
    let client = harness.client("/api/alert");
    let mut data = threshold_alert(&["host-1"]);
    data.interval = Interval::parse("36500d").unwrap();
    data.throttle = Some(Interval::parse("36500d").unwrap());
    let alert = client.create(data).await.unwrap();

    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    assert_eq!(harness.actions.count(), 1);

    let task = harness
        .tasks
        .get(alert.scheduled_task_id.as_deref().unwrap())
        .await
        .unwrap();
    assert!(task.run_at > Utc::now() + Duration::days(36_000));
}

#[tokio::test]
async fn test_panicking_executor_fails_the_run_and_keeps_the_task() {
    let harness = Harness::new();
    harness
        .setup
        .register_type(AlertType::new("first-host", "First host", FirstHost))
        .unwrap();
    let client = harness.client("/api/alert");
    let data: CreateAlertData = serde_json::from_value(json!({
        "name": "first host",
        "alertTypeId": "first-host",
        "interval": "1m",
        "params": { "hosts": [] }
    }))
    .unwrap();
    let alert = client.create(data).await.unwrap();
    let task_id = alert.scheduled_task_id.clone().unwrap();

    assert!(matches!(harness.run(&alert).await, TaskRunOutcome::Failed(ref message) if message.contains("panicked")));
    let task = harness.tasks.get(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Idle);
    assert!(task.last_error.is_some());

    assert!(matches!(harness.run(&alert).await, TaskRunOutcome::Failed(_)));

    let update: UpdateAlertData = serde_json::from_value(json!({
        "name": "first host",
        "interval": "1m",
        "params": { "hosts": ["host-9"] },
        "actions": []
    }))
    .unwrap();
    client.update(&alert.id, update).await.unwrap();
    assert_eq!(harness.run(&alert).await, TaskRunOutcome::Succeeded);
    let state = client.get_alert_state(&alert.id).await.unwrap().unwrap();
    assert_eq!(state.alert_type_state, json!({ "first": "host-9" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_instance_mutes_are_all_kept() {
    let harness = Harness::new();
    let client = Arc::new(harness.client("/api/alert"));
    let alert = client.create(threshold_alert(&[])).await.unwrap();

    let mutes: Vec<_> = (0..8)
        .map(|n| {
            let client = Arc::clone(&client);
            let alert_id = alert.id.clone();
            tokio::spawn(async move { client.mute_instance(&alert_id, &format!("host-{n}")).await })
        })
        .collect();
    for mute in mutes {
        mute.await.unwrap().unwrap();
    }

    let mut muted = client.get(&alert.id).await.unwrap().muted_instance_ids;
    muted.sort();
    let expected: Vec<String> = (0..8).map(|n| format!("host-{n}")).collect();
    assert_eq!(muted, expected);
}
