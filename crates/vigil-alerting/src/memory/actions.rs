//! Recording action executor.

use crate::services::{ActionError, ActionExecutor, ExecuteRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::info;

/// Records every executed action instead of delivering it. Actions marked
/// with [`fail_action`](Self::fail_action) fail.
#[derive(Default)]
pub struct RecordingActionExecutor {
    executed: Mutex<Vec<ExecuteRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_action(&self, action_id: &str) {
        self.failing.lock().insert(action_id.to_string());
    }

    pub fn executed(&self) -> Vec<ExecuteRequest> {
        self.executed.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.executed.lock().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingActionExecutor {
    async fn execute(&self, request: ExecuteRequest) -> Result<(), ActionError> {
        if self.failing.lock().contains(&request.action_id) {
            return Err(ActionError::new(request.action_id, "action is configured to fail"));
        }
        info!(
            target: "plugins::actions",
            action_id = %request.action_id,
            space_id = %request.space_id,
            params = %request.params,
            "executed action"
        );
        self.executed.lock().push(request);
        Ok(())
    }
}
