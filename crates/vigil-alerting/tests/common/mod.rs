//! Shared harness for alerting integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_alerting::memory::{
    LicenseFeed, MemoryApiKeys, MemoryEncryptedStore, MemoryRouter, MemoryTaskManager, PathSpaces,
    RecordingActionExecutor, StaticClusterClient, TaskRunOutcome,
};
use vigil_alerting::{
    Alert, AlertExecutor, AlertType, AlertingPlugin, AlertsClient, CoreSetup, CoreStart, CreateAlertData,
    ExecutorOptions, License, LicenseType, PluginSetup, PluginStart, PluginsSetup, PluginsStart,
    RequestIdentity,
};
use vigil_common_secret::SecretString;

/// Fires every instance id listed in `params.fire` with `params.value` as
/// context, and counts its runs in state.
pub struct FireListed;

#[async_trait]
impl AlertExecutor for FireListed {
    async fn execute(&self, options: ExecutorOptions) -> anyhow::Result<Option<Value>> {
        let fire: Vec<String> = serde_json::from_value(options.params["fire"].clone()).unwrap_or_default();
        for id in fire {
            options
                .services
                .instances
                .schedule_actions(&id, "default", json!({ "value": options.params["value"] }))?;
        }
        let runs = options.state["runs"].as_u64().unwrap_or(0) + 1;
        Ok(Some(json!({ "runs": runs })))
    }
}

/// Always fails.
pub struct Broken;

#[async_trait]
impl AlertExecutor for Broken {
    async fn execute(&self, _: ExecutorOptions) -> anyhow::Result<Option<Value>> {
        anyhow::bail!("condition query timed out")
    }
}

/// Reports the first of `params.hosts`, panicking when there is none.
pub struct FirstHost;

#[async_trait]
impl AlertExecutor for FirstHost {
    async fn execute(&self, options: ExecutorOptions) -> anyhow::Result<Option<Value>> {
        let hosts: Vec<String> = serde_json::from_value(options.params["hosts"].clone()).unwrap_or_default();
        Ok(Some(json!({ "first": hosts[0] })))
    }
}

/// Asks the cluster for a document count and keeps the answer in state.
pub struct CountDocuments;

#[async_trait]
impl AlertExecutor for CountDocuments {
    async fn execute(&self, options: ExecutorOptions) -> anyhow::Result<Option<Value>> {
        let response = options
            .services
            .cluster
            .call_as_current_user("count", json!({ "index": "logs" }))
            .await?;
        Ok(Some(json!({ "count": response["count"] })))
    }
}

pub struct HarnessOptions {
    pub ephemeral_key: bool,
    pub license: Option<License>,
    pub server_base_path: String,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            ephemeral_key: false,
            license: Some(License::active(LicenseType::Basic)),
            server_base_path: String::new(),
        }
    }
}

/// A set-up and started plugin over in-process collaborators.
pub struct Harness {
    pub plugin: AlertingPlugin,
    pub setup: PluginSetup,
    pub start: PluginStart,
    pub store: Arc<MemoryEncryptedStore>,
    pub tasks: Arc<MemoryTaskManager>,
    pub actions: Arc<RecordingActionExecutor>,
    pub api_keys: Arc<MemoryApiKeys>,
    pub router: Arc<MemoryRouter>,
    pub licensing: Arc<LicenseFeed>,
    pub cluster: StaticClusterClient,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        vigil_test_utils::init_tracing();

        let store = Arc::new(if options.ephemeral_key {
            MemoryEncryptedStore::ephemeral()
        } else {
            MemoryEncryptedStore::with_key(&SecretString::from("integration-test-encryption-key-000"))
        });
        let tasks = Arc::new(MemoryTaskManager::new());
        let actions = Arc::new(RecordingActionExecutor::new());
        let api_keys = Arc::new(MemoryApiKeys::new());
        let router = Arc::new(MemoryRouter::new());
        let licensing = Arc::new(match options.license {
            Some(license) => LicenseFeed::with_license(license),
            None => LicenseFeed::new(),
        });
        let cluster = StaticClusterClient::new().with_response("count", json!({ "count": 17 }));

        let mut plugin = AlertingPlugin::new();
        let setup = plugin
            .setup(
                CoreSetup {
                    http: router.clone(),
                    server_base_path: options.server_base_path.clone(),
                },
                PluginsSetup {
                    licensing: licensing.clone(),
                    encrypted_saved_objects: store.clone(),
                    task_manager: tasks.clone(),
                },
            )
            .unwrap();

        setup.register_type(AlertType::new("threshold", "Threshold", FireListed)).unwrap();
        setup.register_type(AlertType::new("broken", "Broken", Broken)).unwrap();
        setup
            .register_type(AlertType::new("count", "Document count", CountDocuments))
            .unwrap();

        let start = plugin
            .start(
                CoreStart {
                    saved_objects: store.clone(),
                    cluster: Arc::new(cluster.clone()),
                },
                PluginsStart {
                    actions: actions.clone(),
                    encrypted_saved_objects: store.clone(),
                    task_manager: tasks.clone(),
                    spaces: Some(Arc::new(PathSpaces::new(options.server_base_path))),
                    security: Some(api_keys.clone()),
                },
            )
            .unwrap();

        Self {
            plugin,
            setup,
            start,
            store,
            tasks,
            actions,
            api_keys,
            router,
            licensing,
            cluster,
        }
    }

    /// Client for `path`, acting as `elastic`.
    pub fn client(&self, path: &str) -> AlertsClient {
        self.start
            .alerts_client_with_request(&RequestIdentity::new(path).with_principal("elastic"))
            .unwrap()
    }

    pub async fn run(&self, alert: &Alert) -> TaskRunOutcome {
        let task_id = alert.scheduled_task_id.as_deref().expect("alert is not scheduled");
        self.tasks.run_task(task_id).await.unwrap()
    }
}

/// A `threshold` alert firing `fire` with one `pager` action.
pub fn threshold_alert(fire: &[&str]) -> CreateAlertData {
    serde_json::from_value(json!({
        "name": "cpu high",
        "tags": ["infra"],
        "alertTypeId": "threshold",
        "interval": "1m",
        "params": { "fire": fire, "value": 90 },
        "actions": [{
            "group": "default",
            "id": "pager",
            "params": { "message": "{{alertName}} {{alertInstanceId}} {{context.value}}" }
        }]
    }))
    .unwrap()
}
