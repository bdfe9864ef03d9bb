//! Rendering of action params.
//!
//! Every string inside an action's params is a handlebars template over the
//! firing alert and instance: `{{alertId}}`, `{{alertName}}`, `{{spaceId}}`,
//! `{{tags}}`, `{{alertInstanceId}}`, `{{context.*}}` and `{{state.*}}`.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value};

/// Variables available to action param templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplateVars<'a> {
    pub alert_id: &'a str,
    pub alert_name: &'a str,
    pub space_id: &'a str,
    pub tags: &'a [String],
    pub alert_instance_id: &'a str,
    pub context: &'a Value,
    pub state: &'a Value,
}

/// Renders action params for dispatch.
pub struct ActionParamsRenderer {
    handlebars: Handlebars<'static>,
}

impl ActionParamsRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render every string in `params`. Non-string values pass through.
    pub fn render(&self, params: &Value, vars: &ActionTemplateVars<'_>) -> Result<Value, String> {
        let data = serde_json::to_value(vars).map_err(|e| e.to_string())?;
        self.render_value(params, &data)
    }

    fn render_value(&self, value: &Value, data: &Value) -> Result<Value, String> {
        match value {
            Value::String(template) if template.contains("{{") => self
                .handlebars
                .render_template(template, data)
                .map(Value::String)
                .map_err(|e| e.to_string()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value(item, data))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => fields
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.render_value(item, data)?)))
                .collect::<Result<Map<_, _>, String>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }
}

impl Default for ActionParamsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars<'a>(tags: &'a [String], context: &'a Value, state: &'a Value) -> ActionTemplateVars<'a> {
        ActionTemplateVars {
            alert_id: "alert-1",
            alert_name: "cpu high",
            space_id: "ops",
            tags,
            alert_instance_id: "host-a",
            context,
            state,
        }
    }

    #[test]
    fn test_renders_nested_strings() {
        let tags = vec!["prod".to_string()];
        let context = json!({ "value": 97.5 });
        let state = json!({ "count": 3 });

        let rendered = ActionParamsRenderer::new()
            .render(
                &json!({
                    "subject": "[{{spaceId}}] {{alertName}} fired for {{alertInstanceId}}",
                    "body": ["value {{context.value}}", "seen {{state.count}} times"],
                    "meta": { "alert": "{{alertId}}", "priority": 1, "html": "<b>{{alertName}}</b>" }
                }),
                &vars(&tags, &context, &state),
            )
            .unwrap();

        assert_eq!(rendered["subject"], "[ops] cpu high fired for host-a");
        assert_eq!(rendered["body"], json!(["value 97.5", "seen 3 times"]));
        assert_eq!(rendered["meta"]["alert"], "alert-1");
        assert_eq!(rendered["meta"]["priority"], 1);
        assert_eq!(rendered["meta"]["html"], "<b>cpu high</b>");
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let tags = Vec::new();
        let empty = json!({});
        let rendered = ActionParamsRenderer::new()
            .render(&json!({ "message": "x{{context.nope}}y" }), &vars(&tags, &empty, &empty))
            .unwrap();
        assert_eq!(rendered["message"], "xy");
    }

    #[test]
    fn test_malformed_template_is_an_error() {
        let tags = Vec::new();
        let empty = json!({});
        let result = ActionParamsRenderer::new()
            .render(&json!({ "message": "{{#if}}" }), &vars(&tags, &empty, &empty));
        assert!(result.is_err());
    }
}
