//! Alert type registry.
//!
//! Registering an alert type also registers a scheduler task definition
//! (`alerting:<type id>`) whose runners come from the [`TaskRunnerFactory`].

use crate::alert_type::{AlertType, RegisteredAlertType};
use crate::error::{AlertingError, Result};
use crate::services::{TaskDefinition, TaskInstance, TaskManager, TaskRun, TaskRunError};
use crate::task_runner::TaskRunnerFactory;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Scheduler task type of an alert type.
pub fn task_type_for(alert_type_id: &str) -> String {
    format!("alerting:{alert_type_id}")
}

/// Process-wide set of alert types.
pub struct AlertTypeRegistry {
    types: RwLock<HashMap<String, Arc<AlertType>>>,
    task_manager: Arc<dyn TaskManager>,
    task_runner_factory: Arc<TaskRunnerFactory>,
}

impl AlertTypeRegistry {
    pub fn new(task_manager: Arc<dyn TaskManager>, task_runner_factory: Arc<TaskRunnerFactory>) -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            task_manager,
            task_runner_factory,
        }
    }

    /// Register an alert type.
    ///
    /// Fails with [`AlertingError::DuplicateType`] when the id is taken; the
    /// existing registration is left untouched.
    pub fn register(&self, alert_type: AlertType) -> Result<()> {
        alert_type.check_definition()?;

        let mut types = self.types.write();
        if types.contains_key(&alert_type.id) {
            return Err(AlertingError::DuplicateType(alert_type.id));
        }

        let alert_type = Arc::new(alert_type);
        self.task_manager
            .register_task_definitions(vec![self.task_definition(&alert_type)])?;

        info!(
            target: "plugins::alerting",
            alert_type_id = %alert_type.id,
            action_groups = ?alert_type.action_groups,
            "registered alert type"
        );
        types.insert(alert_type.id.clone(), alert_type);
        Ok(())
    }

    fn task_definition(&self, alert_type: &Arc<AlertType>) -> TaskDefinition {
        let factory = Arc::clone(&self.task_runner_factory);
        let runner_type = Arc::clone(alert_type);

        TaskDefinition {
            task_type: task_type_for(&alert_type.id),
            title: alert_type.name.clone(),
            create_task_runner: Arc::new(move |task: TaskInstance| {
                debug!(
                    target: "plugins::alerting",
                    task_id = %task.id,
                    alert_type_id = %runner_type.id,
                    "creating task runner"
                );
                factory
                    .create(Arc::clone(&runner_type), task)
                    .map(|runner| Box::new(runner) as Box<dyn TaskRun>)
                    .map_err(|err| TaskRunError {
                        message: err.to_string(),
                        run_at: None,
                    })
            }),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.types.read().contains_key(id)
    }

    /// Look up an alert type. Fails with [`AlertingError::UnknownType`].
    pub fn get(&self, id: &str) -> Result<Arc<AlertType>> {
        self.types
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AlertingError::UnknownType(id.to_string()))
    }

    /// Snapshot of every registered type.
    pub fn list(&self) -> BTreeSet<RegisteredAlertType> {
        self.types.read().values().map(|t| t.summary()).collect()
    }
}

impl std::fmt::Debug for AlertTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.types.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("AlertTypeRegistry").field("types", &ids).finish()
    }
}

/// Capability to register alert types, handed out at setup.
#[derive(Clone)]
pub struct AlertTypeRegistrar(Arc<AlertTypeRegistry>);

impl AlertTypeRegistrar {
    pub fn new(registry: Arc<AlertTypeRegistry>) -> Self {
        Self(registry)
    }

    pub fn register(&self, alert_type: AlertType) -> Result<()> {
        self.0.register(alert_type)
    }
}

/// Capability to list alert types, handed out at start.
#[derive(Clone)]
pub struct AlertTypeLister(Arc<AlertTypeRegistry>);

impl AlertTypeLister {
    pub fn new(registry: Arc<AlertTypeRegistry>) -> Self {
        Self(registry)
    }

    pub fn list(&self) -> BTreeSet<RegisteredAlertType> {
        self.0.list()
    }
}
