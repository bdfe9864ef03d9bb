//! In-process scheduler.

use crate::services::{
    ScheduledTask, TaskDefinition, TaskInstance, TaskManager, TaskManagerError, TaskRun, TaskRunError,
    TaskRunResult, TaskSpec, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Retry delay for failed runs that did not say when to run next.
const RETRY_DELAY_SECONDS: i64 = 60;

/// Outcome of running one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRunOutcome {
    Succeeded,
    Failed(String),
    /// The task was already running.
    Skipped,
}

/// Scheduler that keeps definitions and tasks in memory and runs tasks
/// when asked ([`run_task`](Self::run_task), [`run_due`](Self::run_due)).
///
/// A task never runs twice concurrently. Failures, panics included, are
/// recorded on the task and never propagate. A task removed while running is
/// not brought back.
#[derive(Default)]
pub struct MemoryTaskManager {
    definitions: RwLock<HashMap<String, TaskDefinition>>,
    tasks: Mutex<HashMap<String, ScheduledTask>>,
}

impl MemoryTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.definitions.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Snapshot of every scheduled task, ordered by id.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.tasks.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Run one task now, whatever its `run_at`.
    pub async fn run_task(&self, id: &str) -> Result<TaskRunOutcome, TaskManagerError> {
        let instance = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))?;
            if task.status == TaskStatus::Running {
                return Ok(TaskRunOutcome::Skipped);
            }
            task.status = TaskStatus::Running;
            TaskInstance {
                id: task.id.clone(),
                task_type: task.task_type.clone(),
                params: task.params.clone(),
                state: task.state.clone(),
                attempts: task.attempts,
                run_at: task.run_at,
            }
        };

        let create_task_runner = self
            .definitions
            .read()
            .get(&instance.task_type)
            .map(|definition| definition.create_task_runner.clone());

        let result = match create_task_runner {
            Some(create) => match create(instance.clone()) {
                Ok(runner) => run_isolated(runner).await,
                Err(err) => Err(err),
            },
            None => {
                self.finish(id, |task| {
                    task.status = TaskStatus::Idle;
                    task.last_error = Some(format!("task type \"{}\" is not defined", task.task_type));
                });
                return Err(TaskManagerError::UnknownTaskType(instance.task_type));
            }
        };

        let now = Utc::now();
        let outcome = match result {
            Ok(result) => {
                self.finish(id, |task| {
                    task.state = result.state;
                    task.run_at = result.run_at.unwrap_or(now);
                    task.attempts = 0;
                    task.last_error = None;
                    task.status = TaskStatus::Idle;
                });
                TaskRunOutcome::Succeeded
            }
            Err(err) => {
                warn!(
                    target: "plugins::task_manager",
                    task_id = %id,
                    task_type = %instance.task_type,
                    error = %err,
                    "task run failed"
                );
                let message = err.message.clone();
                self.finish(id, |task| {
                    task.run_at = err
                        .run_at
                        .unwrap_or_else(|| now + Duration::seconds(RETRY_DELAY_SECONDS));
                    task.attempts += 1;
                    task.last_error = Some(err.message);
                    task.status = TaskStatus::Idle;
                });
                TaskRunOutcome::Failed(message)
            }
        };
        Ok(outcome)
    }

    fn finish(&self, id: &str, update: impl FnOnce(&mut ScheduledTask)) {
        match self.tasks.lock().get_mut(id) {
            Some(task) => update(task),
            None => debug!(target: "plugins::task_manager", task_id = %id, "task removed while running"),
        }
    }

    /// Run every idle task whose `run_at` is not after `now`, one at a time.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Vec<(String, TaskRunOutcome)> {
        let mut due: Vec<(DateTime<Utc>, String)> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.status == TaskStatus::Idle && t.run_at <= now)
            .map(|t| (t.run_at, t.id.clone()))
            .collect();
        due.sort();

        let mut outcomes = Vec::with_capacity(due.len());
        for (_, id) in due {
            match self.run_task(&id).await {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(err) => outcomes.push((id, TaskRunOutcome::Failed(err.to_string()))),
            }
        }
        outcomes
    }
}

/// Run `runner` on its own task so a panic becomes a failed run.
async fn run_isolated(runner: Box<dyn TaskRun>) -> Result<TaskRunResult, TaskRunError> {
    match tokio::spawn(async move { runner.run().await }).await {
        Ok(result) => result,
        Err(err) => {
            let message = if err.is_panic() {
                let payload = err.into_panic();
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown cause".to_string());
                format!("task runner panicked: {detail}")
            } else {
                "task runner was cancelled".to_string()
            };
            Err(TaskRunError { message, run_at: None })
        }
    }
}

#[async_trait]
impl TaskManager for MemoryTaskManager {
    fn register_task_definitions(&self, definitions: Vec<TaskDefinition>) -> Result<(), TaskManagerError> {
        let mut registered = self.definitions.write();
        if let Some(duplicate) = definitions.iter().find(|d| registered.contains_key(&d.task_type)) {
            return Err(TaskManagerError::DuplicateDefinition(duplicate.task_type.clone()));
        }
        for definition in definitions {
            registered.insert(definition.task_type.clone(), definition);
        }
        Ok(())
    }

    async fn schedule(&self, task: TaskSpec) -> Result<ScheduledTask, TaskManagerError> {
        if !self.definitions.read().contains_key(&task.task_type) {
            return Err(TaskManagerError::UnknownTaskType(task.task_type));
        }

        let scheduled = ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            task_type: task.task_type,
            params: task.params,
            state: task.state,
            scope: task.scope,
            run_at: Utc::now(),
            attempts: 0,
            status: TaskStatus::Idle,
            last_error: None,
        };
        self.tasks.lock().insert(scheduled.id.clone(), scheduled.clone());
        debug!(target: "plugins::task_manager", task_id = %scheduled.id, task_type = %scheduled.task_type, "scheduled task");
        Ok(scheduled)
    }

    async fn get(&self, id: &str) -> Result<ScheduledTask, TaskManagerError> {
        self.tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<(), TaskManagerError> {
        self.tasks
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TaskManagerError::NotFound(id.to_string()))
    }
}
