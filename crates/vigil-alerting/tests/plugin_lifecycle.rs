//! Setup, start and stop, and the gates in front of the alerts API.

mod common;

use common::{threshold_alert, FireListed, Harness, HarnessOptions};
use serde_json::json;
use std::sync::Arc;
use vigil_alerting::memory::{
    LicenseFeed, MemoryEncryptedStore, MemoryRouter, MemoryTaskManager, RecordingActionExecutor,
    StaticClusterClient,
};
use vigil_alerting::routes::HttpMethod;
use vigil_alerting::services::{FindQuery, SavedObjectsRepository};
use vigil_alerting::{
    AlertType, AlertingError, AlertingPlugin, CoreSetup, CoreStart, License, LicenseType, PluginsSetup,
    PluginsStart, RequestIdentity,
};
use vigil_test_utils::assert_err;

#[test]
fn test_setup_registers_every_route_behind_the_license_gate() {
    let harness = Harness::new();
    let routes = harness.router.routes();

    assert_eq!(routes.len(), 14);
    assert!(routes.contains(&(HttpMethod::Post, "/api/alert")));
    assert!(routes.contains(&(HttpMethod::Get, "/api/alert/_find")));
    assert!(routes.contains(&(
        HttpMethod::Post,
        "/api/alert/{alert_id}/alert_instance/{alert_instance_id}/_mute"
    )));
}

#[test]
fn test_alert_types_register_once() {
    let harness = Harness::new();

    let err = assert_err!(harness
        .setup
        .register_type(AlertType::new("threshold", "Threshold again", FireListed)));
    assert!(matches!(err, AlertingError::DuplicateType(ref id) if id == "threshold"));
    assert_eq!(err.status_code(), 409);

    let ids: Vec<String> = harness.start.list_types().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["broken", "count", "threshold"]);
    assert_eq!(
        harness.tasks.task_types(),
        vec!["alerting:broken", "alerting:count", "alerting:threshold"]
    );
}

#[tokio::test]
async fn test_ephemeral_key_refuses_clients_without_side_effects() {
    let harness = Harness::with_options(HarnessOptions {
        ephemeral_key: true,
        ..HarnessOptions::default()
    });

    let err = assert_err!(harness
        .start
        .alerts_client_with_request(&RequestIdentity::new("/api/alert")));
    assert!(matches!(err, AlertingError::EphemeralEncryptionKey));

    let body = serde_json::to_value(threshold_alert(&["host-1"])).unwrap();
    let err = assert_err!(
        harness
            .router
            .call(&harness.start, HttpMethod::Post, "/api/alert", Some("elastic"), body)
            .await
    );
    assert!(err.is_gate_rejection());

    let stored = harness.store.find("alert", &FindQuery::default(), None).await.unwrap();
    assert_eq!(stored.total, 0);
    assert!(harness.tasks.tasks().is_empty());
    assert!(harness.api_keys.active_keys().is_empty());

    // Listing types does not need a client.
    let types = harness
        .router
        .call(&harness.start, HttpMethod::Get, "/api/alert/types", None, json!(null))
        .await
        .unwrap();
    assert_eq!(types.status, 200);
}

#[tokio::test]
async fn test_license_changes_apply_to_the_next_request() {
    let harness = Harness::with_options(HarnessOptions {
        license: None,
        ..HarnessOptions::default()
    });
    let list = || {
        harness
            .router
            .call(&harness.start, HttpMethod::Get, "/api/alert/_find", Some("elastic"), json!(null))
    };

    let err = assert_err!(list().await);
    assert_eq!(err.status_code(), 403);
    assert!(err.to_string().contains("license information is not available"));

    harness.licensing.publish(License::active(LicenseType::Gold));
    assert_eq!(list().await.unwrap().status, 200);

    harness.licensing.publish(License::expired(LicenseType::Gold));
    let err = assert_err!(list().await);
    assert!(err.to_string().contains("your gold license has expired"));

    harness.licensing.publish(License::active(LicenseType::Basic));
    assert_eq!(list().await.unwrap().status, 200);
}

#[tokio::test]
async fn test_stop_fails_closed() {
    let mut harness = Harness::new();
    let alert = harness.client("/api/alert").create(threshold_alert(&[])).await.unwrap();
    assert_eq!(harness.licensing.subscriber_count(), 1);

    harness.plugin.stop();
    harness.plugin.stop();

    assert_eq!(harness.licensing.subscriber_count(), 0);
    assert!(!harness.start.check_license().is_valid());
    let err = assert_err!(harness
        .start
        .alerts_client_with_request(&RequestIdentity::new("/api/alert")));
    assert!(matches!(err, AlertingError::LicenseInvalid { .. }));

    let path = format!("/api/alert/{}", alert.id);
    let err = assert_err!(
        harness
            .router
            .call(&harness.start, HttpMethod::Get, &path, Some("elastic"), json!(null))
            .await
    );
    assert_eq!(err.status_code(), 403);
}

#[test]
fn test_lifecycle_order_is_enforced() {
    let store = Arc::new(MemoryEncryptedStore::ephemeral());
    let tasks = Arc::new(MemoryTaskManager::new());
    let plugins_setup = || PluginsSetup {
        licensing: Arc::new(LicenseFeed::new()),
        encrypted_saved_objects: store.clone(),
        task_manager: tasks.clone(),
    };
    let core_setup = || CoreSetup {
        http: Arc::new(MemoryRouter::new()),
        server_base_path: String::new(),
    };
    let start = |plugin: &mut AlertingPlugin| {
        plugin.start(
            CoreStart {
                saved_objects: store.clone(),
                cluster: Arc::new(StaticClusterClient::new()),
            },
            PluginsStart {
                actions: Arc::new(RecordingActionExecutor::new()),
                encrypted_saved_objects: store.clone(),
                task_manager: tasks.clone(),
                spaces: None,
                security: None,
            },
        )
    };

    let mut plugin = AlertingPlugin::new();
    assert!(matches!(start(&mut plugin), Err(AlertingError::Lifecycle(_))));

    plugin.setup(core_setup(), plugins_setup()).unwrap();
    assert!(matches!(
        plugin.setup(core_setup(), plugins_setup()),
        Err(AlertingError::Lifecycle(_))
    ));

    assert!(start(&mut plugin).is_ok());
    assert!(matches!(start(&mut plugin), Err(AlertingError::AlreadyInitialized)));
}

#[tokio::test]
async fn test_setup_registers_alert_type_for_encryption() {
    let store = Arc::new(MemoryEncryptedStore::ephemeral());
    let mut plugin = AlertingPlugin::new();
    plugin
        .setup(
            CoreSetup {
                http: Arc::new(MemoryRouter::new()),
                server_base_path: String::new(),
            },
            PluginsSetup {
                licensing: Arc::new(LicenseFeed::new()),
                encrypted_saved_objects: store.clone(),
                task_manager: Arc::new(MemoryTaskManager::new()),
            },
        )
        .unwrap();

    let created = store
        .create("alert", json!({ "name": "a", "apiKey": "secret" }), None)
        .await
        .unwrap();
    assert!(created.attributes.get("apiKey").is_none());
    let raw = store.raw_attributes("alert", &created.id).unwrap();
    assert_ne!(raw["apiKey"], json!("secret"));
}
