//! `segment_label`: a workspace label, identified by its key and value.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::required;
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId, DELIMITER};
use crate::pagination;
use crate::resource::{extract, Resource, ResourceError};
use crate::schema::{Attribute, Diagnostic, Schema};

/// Plan and state of a label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelState {
    /// Label key, e.g. `environment`.
    pub key: String,
    /// Label value, e.g. `prod`.
    pub value: String,
    /// Description.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelWire {
    key: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl From<LabelWire> for LabelState {
    fn from(wire: LabelWire) -> Self {
        Self {
            key: wire.key,
            value: wire.value,
            description: wire.description,
        }
    }
}

/// The `segment_label` resource.
pub struct Label {
    api: Arc<dyn Api>,
}

impl Label {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for Label {
    type State = LabelState;

    const TYPE_NAME: &'static str = "segment_label";
    const DISPLAY_NAME: &'static str = "label";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Pair("key", "value");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Segment workspace label.")
            .with_attribute("key", Attribute::required_string().with_force_new())
            .with_attribute("value", Attribute::required_string().with_force_new())
            .with_attribute("description", Attribute::optional_string().with_force_new())
    }

    fn validate(plan: &LabelState, diagnostics: &mut Vec<Diagnostic>) {
        // The pair is also the import identifier, so neither half may hold the delimiter.
        for (name, text) in [("key", &plan.key), ("value", &plan.value)] {
            if text.contains(DELIMITER) {
                diagnostics.push(
                    Diagnostic::error(format!("Label {} must not contain '{}'", name, DELIMITER))
                        .with_attribute(name),
                );
            }
        }
    }

    fn from_import(id: &ImportId) -> LabelState {
        LabelState {
            key: id.first().to_string(),
            value: id.second().to_string(),
            description: None,
        }
    }

    async fn create(&self, plan: &LabelState) -> Result<LabelState, ResourceError> {
        let label = LabelWire {
            key: plan.key.clone(),
            value: plan.value.clone(),
            description: plan.description.clone(),
        };
        let response = self
            .api
            .send(ApiRequest::post("/labels").with_body(json!({"label": label})))
            .await?;
        let created: LabelWire = extract(&response, "label")?;
        Ok(created.into())
    }

    async fn read(&self, state: &LabelState) -> Result<LabelState, ResourceError> {
        let labels: Vec<LabelWire> =
            pagination::list_all(self.api.as_ref(), "/labels", "labels").await?;
        labels
            .into_iter()
            .find(|label| label.key == state.key && label.value == state.value)
            .map(LabelState::from)
            .ok_or_else(|| ResourceError::Gone(format!("label {}:{}", state.key, state.value)))
    }

    // Every attribute forces replacement, so the plan can only equal the prior state.
    async fn update(
        &self,
        plan: &LabelState,
        _prior: &LabelState,
    ) -> Result<LabelState, ResourceError> {
        Ok(plan.clone())
    }

    async fn delete(&self, state: &LabelState) -> Result<(), ResourceError> {
        let key = required(Some(&state.key), "key")?;
        let value = required(Some(&state.value), "value")?;
        let path = format!("/labels/{}{}{}", segment(key), DELIMITER, segment(value));
        self.api.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::ScriptedApi;

    #[tokio::test]
    async fn test_create_then_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "POST",
            "/labels",
            200,
            json!({"data": {"label": {"key": "env", "value": "prod", "description": "Production"}}}),
        );
        api.respond(
            "GET",
            "/labels",
            200,
            json!({"data": {"labels": [
                {"key": "env", "value": "dev"},
                {"key": "env", "value": "prod", "description": "Production"},
            ]}}),
        );

        let adapter = ResourceAdapter::new(Label::new(api.clone()));
        let created = adapter
            .create(json!({"key": "env", "value": "prod", "description": "Production"}))
            .await
            .unwrap();

        assert_eq!(
            api.last_body("POST", "/labels"),
            Some(json!({"label": {"key": "env", "value": "prod", "description": "Production"}}))
        );
        assert_eq!(adapter.read(created.clone()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_read_unlisted_label_removes_it() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/labels", 200, json!({"data": {"labels": []}}));

        let adapter = ResourceAdapter::new(Label::new(api.clone()));
        let state = adapter.read(adapter.import("env:prod").unwrap()).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_delete_uses_pair_path() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("DELETE", "/labels/env:prod", 200, json!({"data": {}}));

        let adapter = ResourceAdapter::new(Label::new(api.clone()));
        adapter
            .delete(json!({"key": "env", "value": "prod"}))
            .await
            .unwrap();
        assert_eq!(api.requests_to("DELETE", "/labels/env:prod").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_escapes_value() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("DELETE", "/labels/team:a%2Fb", 200, json!({"data": {}}));

        let adapter = ResourceAdapter::new(Label::new(api.clone()));
        adapter
            .delete(json!({"key": "team", "value": "a/b"}))
            .await
            .unwrap();
        assert_eq!(api.requests_to("DELETE", "/labels/team:a%2Fb").len(), 1);
        assert!(api.requests_to("DELETE", "/labels/team:a/b").is_empty());
    }

    #[test]
    fn test_delimiter_rejected_in_key() {
        let api = Arc::new(ScriptedApi::new());
        let adapter = ResourceAdapter::new(Label::new(api));
        let diagnostics = adapter.validate(&json!({"key": "a:b", "value": "c"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("key"));
    }
}
