//! `segment_function`: a custom source, destination or insert function.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::required;
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{extract, Resource, ResourceError};
use crate::schema::{Attribute, Diagnostic, Schema};

/// Function kinds accepted by the API.
pub const RESOURCE_TYPES: [&str; 3] = ["SOURCE", "DESTINATION", "INSERT_DESTINATION"];

/// Plan and state of a function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionState {
    /// Remote identifier.
    pub id: Option<String>,
    /// JavaScript source code.
    pub code: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: Option<String>,
    /// Logo URL.
    pub logo_url: Option<String>,
    /// One of [`RESOURCE_TYPES`].
    pub resource_type: String,
    /// Catalog id assigned to the function.
    pub catalog_id: Option<String>,
    /// Webhook for previewing the function.
    pub preview_webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionWire {
    id: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    logo_url: Option<String>,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    catalog_id: Option<String>,
    #[serde(default)]
    preview_webhook_url: Option<String>,
}

impl From<FunctionWire> for FunctionState {
    fn from(wire: FunctionWire) -> Self {
        Self {
            id: Some(wire.id),
            code: wire.code,
            display_name: wire.display_name,
            description: wire.description,
            logo_url: wire.logo_url,
            resource_type: wire.resource_type,
            catalog_id: wire.catalog_id,
            preview_webhook_url: wire.preview_webhook_url,
        }
    }
}

/// The `segment_function` resource.
pub struct Function {
    api: Arc<dyn Api>,
}

impl Function {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for Function {
    type State = FunctionState;

    const TYPE_NAME: &'static str = "segment_function";
    const DISPLAY_NAME: &'static str = "function";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("function_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Segment function.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("code", Attribute::required_string())
            .with_attribute("display_name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("logo_url", Attribute::optional_string())
            .with_attribute(
                "resource_type",
                Attribute::required_string()
                    .with_description("SOURCE, DESTINATION or INSERT_DESTINATION.")
                    .with_force_new(),
            )
            .with_attribute("catalog_id", Attribute::computed_string())
            .with_attribute("preview_webhook_url", Attribute::computed_string())
    }

    fn validate(plan: &FunctionState, diagnostics: &mut Vec<Diagnostic>) {
        if !RESOURCE_TYPES.contains(&plan.resource_type.as_str()) {
            diagnostics.push(
                Diagnostic::error(format!("Unknown function type '{}'", plan.resource_type))
                    .with_detail(format!("expected one of {}", RESOURCE_TYPES.join(", ")))
                    .with_attribute("resource_type"),
            );
        }
    }

    fn from_import(id: &ImportId) -> FunctionState {
        FunctionState {
            id: Some(id.first().to_string()),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &FunctionState) -> Result<FunctionState, ResourceError> {
        let response = self
            .api
            .send(ApiRequest::post("/functions").with_body(json!({
                "code": plan.code,
                "displayName": plan.display_name,
                "description": plan.description,
                "logoUrl": plan.logo_url,
                "resourceType": plan.resource_type,
            })))
            .await?;
        let function: FunctionWire = extract(&response, "function")?;
        Ok(function.into())
    }

    async fn read(&self, state: &FunctionState) -> Result<FunctionState, ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        let response = self
            .api
            .send(ApiRequest::get(format!("/functions/{}", segment(id))))
            .await?;
        let function: FunctionWire = extract(&response, "function")?;
        Ok(function.into())
    }

    async fn update(
        &self,
        plan: &FunctionState,
        prior: &FunctionState,
    ) -> Result<FunctionState, ResourceError> {
        let id = required(prior.id.as_deref(), "id")?;
        let response = self
            .api
            .send(ApiRequest::patch(format!("/functions/{}", segment(id))).with_body(json!({
                "code": plan.code,
                "displayName": plan.display_name,
                "description": plan.description,
                "logoUrl": plan.logo_url,
            })))
            .await?;
        let function: FunctionWire = extract(&response, "function")?;
        Ok(function.into())
    }

    async fn delete(&self, state: &FunctionState) -> Result<(), ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        self.api
            .send(ApiRequest::delete(format!("/functions/{}", segment(id))))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::{assert_error_contains, ScriptedApi};
    use serde_json::Value;

    fn function_body(code: &str) -> Value {
        json!({"data": {"function": {
            "id": "fn_1",
            "code": code,
            "displayName": "Enrich",
            "resourceType": "INSERT_DESTINATION",
            "catalogId": "cat_1",
            "previewWebhookUrl": "https://fn.segment.test/preview",
        }}})
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("POST", "/functions", 200, function_body("async function onTrack() {}"));
        api.respond("GET", "/functions/fn_1", 200, function_body("async function onTrack() {}"));

        let adapter = ResourceAdapter::new(Function::new(api.clone()));
        let created = adapter
            .create(json!({
                "code": "async function onTrack() {}",
                "display_name": "Enrich",
                "resource_type": "INSERT_DESTINATION",
            }))
            .await
            .unwrap();

        assert_eq!(created["catalog_id"], "cat_1");
        assert_eq!(adapter.read(created.clone()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected_locally() {
        let api = Arc::new(ScriptedApi::new());
        let adapter = ResourceAdapter::new(Function::new(api.clone()));

        let err = adapter
            .create(json!({"code": "x", "display_name": "x", "resource_type": "WEBHOOK"}))
            .await
            .unwrap_err();

        assert_error_contains(&err, "Unknown function type");
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_is_wrapped() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "PATCH",
            "/functions/fn_1",
            422,
            json!({"errors": [{"type": "validation", "message": "code does not compile"}]}),
        );

        let adapter = ResourceAdapter::new(Function::new(api.clone()));
        let state = json!({"id": "fn_1", "code": "x", "display_name": "x",
            "resource_type": "SOURCE"});
        let err = adapter.update(state.clone(), state).await.unwrap_err();

        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics[0].summary, "Unable to update function");
        assert!(diagnostics[0]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("code does not compile"));
    }
}
