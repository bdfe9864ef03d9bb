//! Vigil alerting runner.
//!
//! Wires the alerting plugin to in-process collaborators, registers a
//! document-count threshold alert type, creates one alert and runs it for a
//! few scheduler ticks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vigil_alerting::memory::{
    LicenseFeed, MemoryApiKeys, MemoryEncryptedStore, MemoryRouter, MemoryTaskManager, PathSpaces,
    RecordingActionExecutor, StaticClusterClient, TaskRunOutcome,
};
use vigil_alerting::routes::HttpMethod;
use vigil_alerting::{
    AlertExecutor, AlertType, AlertingPlugin, CoreSetup, CoreStart, ExecutorOptions, Interval, License,
    LicenseType, PluginsSetup, PluginsStart,
};
use vigil_common_config::{vars, ConfigLoader, Environment};
use vigil_common_log::LogConfig;
use vigil_common_secret::SecretString;

#[derive(Debug, Parser)]
#[command(name = "vigil-alerting", version, about = "Run a threshold alert against in-process collaborators")]
struct Args {
    /// Configuration file (defaults to .vigil/config.yaml when present)
    #[arg(short, long, env = "VIGIL_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Number of scheduler ticks to run
    #[arg(long, default_value_t = 3)]
    ticks: u32,

    /// Space to create the alert in
    #[arg(long)]
    space: Option<String>,
}

/// Fires when the `count` endpoint reports at least `threshold` documents.
struct DocumentCountThreshold;

#[async_trait]
impl AlertExecutor for DocumentCountThreshold {
    async fn execute(&self, options: ExecutorOptions) -> anyhow::Result<Option<Value>> {
        let threshold = options.params["threshold"].as_u64().unwrap_or(0);
        let response = options
            .services
            .cluster
            .call_as_current_user("count", json!({ "index": options.params["index"] }))
            .await?;
        let count = response["count"].as_u64().unwrap_or(0);

        if count >= threshold {
            options
                .services
                .instances
                .schedule_actions("documents", "default", json!({ "count": count, "threshold": threshold }))?;
        }

        let runs = options.state["runs"].as_u64().unwrap_or(0) + 1;
        Ok(Some(json!({ "runs": runs, "lastCount": count })))
    }
}

fn threshold_params(params: &Value) -> std::result::Result<Value, String> {
    match params.get("threshold").and_then(Value::as_u64) {
        Some(_) => Ok(params.clone()),
        None => Err("threshold must be a non-negative integer".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _env = Environment::init();
    vigil_common_log::init(LogConfig::from_env()).context("failed to initialize logging")?;

    let args = Args::parse();
    let loader = ConfigLoader::new(".");
    let mut config = match &args.config {
        Some(path) => loader.load_file(path)?,
        None => loader.load()?,
    };
    if let Some(key) = Environment::get(vars::VIGIL_ENCRYPTION_KEY) {
        config.encrypted_saved_objects.encryption_key = Some(SecretString::new(key));
    }

    info!("Starting Vigil alerting v{}", env!("CARGO_PKG_VERSION"));

    let base_path = config.server.base_path.clone();
    let store = Arc::new(MemoryEncryptedStore::from_config(&config.encrypted_saved_objects));
    let tasks = Arc::new(MemoryTaskManager::new());
    let actions = Arc::new(RecordingActionExecutor::new());
    let router = Arc::new(MemoryRouter::new());
    let licensing = Arc::new(LicenseFeed::with_license(License::active(LicenseType::Trial)));
    let cluster = StaticClusterClient::new().with_response("count", json!({ "count": 42 }));

    let mut plugin = AlertingPlugin::new();
    let setup = plugin.setup(
        CoreSetup {
            http: router.clone(),
            server_base_path: base_path.clone(),
        },
        PluginsSetup {
            licensing,
            encrypted_saved_objects: store.clone(),
            task_manager: tasks.clone(),
        },
    )?;
    setup.register_type(
        AlertType::new("doc-count", "Document count threshold", DocumentCountThreshold)
            .with_params_validator(threshold_params),
    )?;

    let start = plugin.start(
        CoreStart {
            saved_objects: store.clone(),
            cluster: Arc::new(cluster),
        },
        PluginsStart {
            actions: actions.clone(),
            encrypted_saved_objects: store,
            task_manager: tasks.clone(),
            spaces: Some(Arc::new(PathSpaces::new(base_path.clone()))),
            security: Some(Arc::new(MemoryApiKeys::new())),
        },
    )?;
    info!(routes = router.routes().len(), "alerts API registered");

    let space = args.space.unwrap_or(config.alerting.default_space);
    let prefix = if space == "default" {
        base_path.clone()
    } else {
        format!("{base_path}/s/{space}")
    };
    let response = router
        .call(
            &start,
            HttpMethod::Post,
            &format!("{prefix}/api/alert"),
            Some("vigil"),
            json!({
                "name": "too many documents",
                "alertTypeId": "doc-count",
                "interval": config.alerting.default_interval,
                "params": { "index": "logs-*", "threshold": 10 },
                "actions": [{
                    "group": "default",
                    "id": "log",
                    "params": { "message": "{{alertName}}: {{context.count}} documents in space {{spaceId}}" }
                }]
            }),
        )
        .await?;
    let task_id = response.body["scheduledTaskId"]
        .as_str()
        .context("created alert has no scheduled task")?
        .to_string();
    info!(alert_id = %response.body["id"], %task_id, %space, "created alert");

    let poll_interval = Interval::parse(&config.task_manager.poll_interval)?.as_std();
    for tick in 1..=args.ticks {
        match tasks.run_task(&task_id).await? {
            TaskRunOutcome::Succeeded => info!(tick, "alert ran"),
            TaskRunOutcome::Failed(error) => warn!(tick, %error, "alert run failed"),
            TaskRunOutcome::Skipped => info!(tick, "alert already running"),
        }
        if tick < args.ticks {
            tokio::time::sleep(poll_interval).await;
        }
    }

    for request in actions.executed() {
        info!(action_id = %request.action_id, base_path = %request.base_path, params = %request.params, "dispatched action");
    }

    plugin.stop();
    info!("Alerting stopped");
    Ok(())
}
