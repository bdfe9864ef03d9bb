//! The persisted alert record.

use crate::alert_instance::RawAlertInstance;
use crate::error::Result;
use crate::interval::Interval;
use crate::services::SavedObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use vigil_common_secret::SecretString;

/// Saved-object type alerts are stored as.
pub const ALERT_SAVED_OBJECT_TYPE: &str = "alert";

/// Encrypted attribute holding the alert's API key.
pub const API_KEY_ATTRIBUTE: &str = "apiKey";

/// Attributes that can change without re-encrypting the API key.
pub const ATTRIBUTES_EXCLUDED_FROM_AAD: [&str; 4] =
    ["scheduledTaskId", "muteAll", "mutedInstanceIds", "updatedBy"];

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn default_true() -> bool {
    true
}

/// An action to run when an alert instance fires in `group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertAction {
    pub group: String,
    pub id: String,
    #[serde(default = "empty_object")]
    pub params: Value,
}

/// An alert as returned to callers. Never carries the API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub alert_type_id: String,
    pub interval: Interval,
    #[serde(default)]
    pub throttle: Option<Interval>,
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
    pub enabled: bool,
    #[serde(default)]
    pub api_key_owner: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_task_id: Option<String>,
    #[serde(default)]
    pub mute_all: bool,
    #[serde(default)]
    pub muted_instance_ids: Vec<String>,
}

impl Alert {
    pub fn from_saved_object(object: SavedObject) -> Result<Self> {
        let mut attributes = match object.attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        attributes.remove(API_KEY_ATTRIBUTE);
        attributes.insert("id".to_string(), Value::String(object.id));
        Ok(serde_json::from_value(Value::Object(attributes))?)
    }

    /// Whether actions of `instance_id` are suppressed.
    pub fn is_instance_muted(&self, instance_id: &str) -> bool {
        self.mute_all || self.muted_instance_ids.iter().any(|id| id == instance_id)
    }
}

/// An alert read with its API key decrypted. Only the execution and key
/// rotation paths see this.
#[derive(Debug, Clone)]
pub struct DecryptedAlert {
    pub alert: Alert,
    pub api_key: Option<SecretString>,
}

impl DecryptedAlert {
    pub fn from_saved_object(object: SavedObject) -> Result<Self> {
        let api_key = object
            .attributes
            .get(API_KEY_ATTRIBUTE)
            .and_then(Value::as_str)
            .map(|key| SecretString::new(key.to_string()));
        Ok(Self {
            alert: Alert::from_saved_object(object)?,
            api_key,
        })
    }
}

/// Attributes written when an alert is created.
///
/// The API key is plaintext here and encrypted by the store.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewAlertAttributes<'a> {
    pub name: &'a str,
    pub tags: &'a [String],
    pub alert_type_id: &'a str,
    pub interval: Interval,
    pub throttle: Option<Interval>,
    pub params: &'a Value,
    pub actions: &'a [AlertAction],
    pub enabled: bool,
    pub api_key: Option<&'a str>,
    pub api_key_owner: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub updated_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_task_id: Option<&'a str>,
    pub mute_all: bool,
    pub muted_instance_ids: &'a [String],
}

/// Body of a create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertData {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub alert_type_id: String,
    pub interval: Interval,
    #[serde(default)]
    pub throttle: Option<Interval>,
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Body of an update request. Replaces every listed field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlertData {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub interval: Interval,
    #[serde(default)]
    pub throttle: Option<Interval>,
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
}

/// Options for finding alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    pub page: usize,
    pub per_page: usize,
    /// Case-insensitive substring of the alert name.
    pub search: Option<String>,
    pub alert_type_id: Option<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            search: None,
            alert_type_id: None,
        }
    }
}

/// One page of alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResult {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub data: Vec<Alert>,
}

/// Params of an alert's scheduler task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTaskParams {
    pub alert_id: String,
    #[serde(default)]
    pub space_id: String,
}

/// State an alert's task carries from one run to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTaskState {
    /// State returned by the alert type's executor.
    #[serde(default = "empty_object")]
    pub alert_type_state: Value,
    /// Instances that scheduled actions on the last run.
    #[serde(default)]
    pub alert_instances: HashMap<String, RawAlertInstance>,
    #[serde(default)]
    pub previous_started_at: Option<DateTime<Utc>>,
}

impl Default for AlertTaskState {
    fn default() -> Self {
        Self {
            alert_type_state: empty_object(),
            alert_instances: HashMap::new(),
            previous_started_at: None,
        }
    }
}

impl AlertTaskState {
    /// Read state stored on a task. A never-run task has `{}` or `null`.
    pub fn from_task_state(state: &Value) -> Result<Self> {
        if state.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(state.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saved(attributes: Value) -> SavedObject {
        SavedObject {
            id: "alert-1".into(),
            object_type: ALERT_SAVED_OBJECT_TYPE.into(),
            namespace: None,
            attributes,
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn attributes() -> Value {
        json!({
            "name": "cpu high",
            "tags": ["infra"],
            "alertTypeId": "threshold",
            "interval": "1m",
            "params": { "threshold": 90 },
            "actions": [{ "group": "default", "id": "email-1", "params": { "to": "ops@example.com" } }],
            "enabled": true,
            "apiKey": "a2V5LTE6c2VjcmV0",
            "apiKeyOwner": "elastic",
            "createdBy": "elastic",
            "updatedBy": "elastic",
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z",
            "scheduledTaskId": "task-1",
            "muteAll": false,
            "mutedInstanceIds": ["host-b"]
        })
    }

    #[test]
    fn test_alert_from_saved_object_drops_api_key() {
        let alert = Alert::from_saved_object(saved(attributes())).unwrap();
        assert_eq!(alert.id, "alert-1");
        assert_eq!(alert.interval.to_string(), "1m");
        assert_eq!(alert.actions[0].id, "email-1");
        assert_eq!(alert.scheduled_task_id.as_deref(), Some("task-1"));

        let serialized = serde_json::to_string(&alert).unwrap();
        assert!(!serialized.contains("apiKey\""));
        assert!(!serialized.contains("a2V5LTE6c2VjcmV0"));
    }

    #[test]
    fn test_decrypted_alert_keeps_api_key() {
        let decrypted = DecryptedAlert::from_saved_object(saved(attributes())).unwrap();
        assert_eq!(decrypted.api_key.unwrap().expose(), "a2V5LTE6c2VjcmV0");
        assert_eq!(decrypted.alert.name, "cpu high");
    }

    #[test]
    fn test_muted_instances() {
        let mut alert = Alert::from_saved_object(saved(attributes())).unwrap();
        assert!(alert.is_instance_muted("host-b"));
        assert!(!alert.is_instance_muted("host-a"));
        alert.mute_all = true;
        assert!(alert.is_instance_muted("host-a"));
    }

    #[test]
    fn test_create_data_defaults() {
        let data: CreateAlertData = serde_json::from_value(json!({
            "name": "n",
            "alertTypeId": "t",
            "interval": "10s"
        }))
        .unwrap();
        assert!(data.enabled);
        assert!(data.actions.is_empty());
        assert_eq!(data.params, json!({}));
    }

    #[test]
    fn test_task_state_from_empty_task() {
        assert_eq!(AlertTaskState::from_task_state(&Value::Null).unwrap(), AlertTaskState::default());
        assert_eq!(AlertTaskState::from_task_state(&json!({})).unwrap(), AlertTaskState::default());
    }
}
