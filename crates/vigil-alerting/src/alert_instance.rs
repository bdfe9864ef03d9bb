//! Alert instances: the things an alert fires for.
//!
//! An executor reports each condition it finds (a host, a monitor, ...) as
//! an instance keyed by an id of its choosing, and schedules actions for it
//! in one of the alert type's action groups.

use crate::alert::empty_object;
use crate::interval::Interval;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// When an instance last had its actions dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastScheduledActions {
    pub group: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMeta {
    #[serde(default)]
    pub last_scheduled_actions: Option<LastScheduledActions>,
}

/// An instance as persisted in task state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlertInstance {
    #[serde(default)]
    pub meta: InstanceMeta,
    #[serde(default = "empty_object")]
    pub state: Value,
}

impl Default for RawAlertInstance {
    fn default() -> Self {
        Self {
            meta: InstanceMeta::default(),
            state: empty_object(),
        }
    }
}

/// Actions an instance scheduled during the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledActions {
    pub group: String,
    pub context: Value,
}

/// An instance during one run.
#[derive(Debug, Clone)]
pub struct AlertInstance {
    meta: InstanceMeta,
    state: Value,
    scheduled: Option<ScheduledActions>,
}

impl Default for AlertInstance {
    fn default() -> Self {
        Self::from_raw(RawAlertInstance::default())
    }
}

impl AlertInstance {
    pub fn from_raw(raw: RawAlertInstance) -> Self {
        Self {
            meta: raw.meta,
            state: raw.state,
            scheduled: None,
        }
    }

    pub fn to_raw(&self) -> RawAlertInstance {
        RawAlertInstance {
            meta: self.meta.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn has_scheduled_actions(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn scheduled_actions(&self) -> Option<&ScheduledActions> {
        self.scheduled.as_ref()
    }

    /// Whether dispatch is suppressed because the same group already fired
    /// within `throttle` of `now`.
    pub fn is_throttled(&self, throttle: Option<Interval>, now: DateTime<Utc>) -> bool {
        let (Some(scheduled), Some(last)) = (&self.scheduled, &self.meta.last_scheduled_actions) else {
            return false;
        };
        let window = throttle.map(|t| t.as_duration()).unwrap_or_else(chrono::Duration::zero);
        last.group == scheduled.group
            && last
                .date
                .checked_add_signed(window)
                .map_or(true, |until| until > now)
    }

    pub fn update_last_scheduled_actions(&mut self, group: &str, date: DateTime<Utc>) {
        self.meta.last_scheduled_actions = Some(LastScheduledActions {
            group: group.to_string(),
            date,
        });
    }

    pub fn last_scheduled_actions(&self) -> Option<&LastScheduledActions> {
        self.meta.last_scheduled_actions.as_ref()
    }
}

/// Raised when an executor schedules actions in a group its alert type
/// does not declare.
#[derive(Debug, Clone, Error)]
#[error("invalid action group \"{group}\" for instance \"{instance_id}\"")]
pub struct UnknownActionGroup {
    pub instance_id: String,
    pub group: String,
}

/// Handed to executors (through `AlertServices`) to fire instances.
///
/// Instances not touched during a run are dropped from the persisted state.
#[derive(Debug, Clone)]
pub struct AlertInstanceFactory {
    instances: Arc<Mutex<HashMap<String, AlertInstance>>>,
    action_groups: Arc<[String]>,
}

impl AlertInstanceFactory {
    pub fn new(raw: HashMap<String, RawAlertInstance>, action_groups: &[String]) -> Self {
        let instances = raw
            .into_iter()
            .map(|(id, raw)| (id, AlertInstance::from_raw(raw)))
            .collect();
        Self {
            instances: Arc::new(Mutex::new(instances)),
            action_groups: action_groups.into(),
        }
    }

    /// Fire `instance_id` in `group`, with `context` available to action
    /// param templates.
    pub fn schedule_actions(
        &self,
        instance_id: &str,
        group: &str,
        context: Value,
    ) -> Result<(), UnknownActionGroup> {
        if !self.action_groups.iter().any(|g| g == group) {
            return Err(UnknownActionGroup {
                instance_id: instance_id.to_string(),
                group: group.to_string(),
            });
        }
        self.instances
            .lock()
            .entry(instance_id.to_string())
            .or_default()
            .scheduled = Some(ScheduledActions {
            group: group.to_string(),
            context,
        });
        Ok(())
    }

    /// Replace the state kept for `instance_id`.
    pub fn replace_state(&self, instance_id: &str, state: Value) {
        self.instances
            .lock()
            .entry(instance_id.to_string())
            .or_default()
            .state = state;
    }

    /// State kept for `instance_id` since its last run (`{}` if none).
    pub fn state(&self, instance_id: &str) -> Value {
        self.instances
            .lock()
            .get(instance_id)
            .map(|i| i.state.clone())
            .unwrap_or_else(empty_object)
    }

    /// Ids of every instance known in this run.
    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Instances that scheduled actions in this run.
    pub(crate) fn take_scheduled(&self) -> HashMap<String, AlertInstance> {
        std::mem::take(&mut *self.instances.lock())
            .into_iter()
            .filter(|(_, instance)| instance.has_scheduled_actions())
            .collect()
    }
}
