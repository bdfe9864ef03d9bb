//! Background scheduler contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// The task handed to a runner for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInstance {
    pub id: String,
    pub task_type: String,
    pub params: Value,
    /// State returned by the previous successful run.
    pub state: Value,
    /// Consecutive failed runs before this one.
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
}

/// A task to schedule.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_type: String,
    pub params: Value,
    pub state: Value,
    pub scope: Vec<String>,
}

/// Scheduler status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Idle,
    Running,
}

/// A task as known to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: String,
    pub task_type: String,
    pub params: Value,
    pub state: Value,
    pub scope: Vec<String>,
    pub run_at: DateTime<Utc>,
    pub attempts: u32,
    pub status: TaskStatus,
    pub last_error: Option<String>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRunResult {
    /// State to persist and hand to the next run.
    pub state: Value,
    /// When to run next. `None` leaves the schedule to the scheduler.
    pub run_at: Option<DateTime<Utc>>,
}

/// A failed run. The task's state is left unchanged.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskRunError {
    pub message: String,
    /// When to run next, if the runner knows.
    pub run_at: Option<DateTime<Utc>>,
}

/// One invocation of a task.
#[async_trait]
pub trait TaskRun: Send + Sync {
    async fn run(&self) -> Result<TaskRunResult, TaskRunError>;
}

/// Builds the runner for one invocation of a task.
pub type CreateTaskRunner =
    Arc<dyn Fn(TaskInstance) -> Result<Box<dyn TaskRun>, TaskRunError> + Send + Sync>;

/// A task type the scheduler can run.
#[derive(Clone)]
pub struct TaskDefinition {
    pub task_type: String,
    pub title: String,
    pub create_task_runner: CreateTaskRunner,
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("task_type", &self.task_type)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Scheduler errors.
#[derive(Debug, Clone, Error)]
pub enum TaskManagerError {
    #[error("task type \"{0}\" is already defined")]
    DuplicateDefinition(String),

    #[error("task type \"{0}\" is not defined")]
    UnknownTaskType(String),

    #[error("task {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Backend(String),
}

/// Background scheduler.
#[async_trait]
pub trait TaskManager: Send + Sync {
    fn register_task_definitions(
        &self,
        definitions: Vec<TaskDefinition>,
    ) -> Result<(), TaskManagerError>;

    async fn schedule(&self, task: TaskSpec) -> Result<ScheduledTask, TaskManagerError>;

    async fn get(&self, id: &str) -> Result<ScheduledTask, TaskManagerError>;

    async fn remove(&self, id: &str) -> Result<(), TaskManagerError>;
}
