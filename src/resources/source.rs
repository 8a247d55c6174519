//! `segment_source`: a Segment source.
//!
//! The API ignores `name` on create, so a create is a `POST` followed by a
//! `PATCH` that sets the name.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{required, settings_update};
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{extract, plan_settings, Resource, ResourceError};
use crate::schema::{Attribute, AttributeType, AttributeFlags, Schema};
use crate::settings;

/// Plan and state of a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceState {
    /// Remote identifier.
    pub id: Option<String>,
    /// URL-safe identifier chosen by the operator.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Whether the source accepts events.
    pub enabled: bool,
    /// Catalog entry the source is an instance of.
    pub metadata_id: String,
    /// Owning workspace.
    pub workspace_id: Option<String>,
    /// Write keys issued for the source.
    pub write_keys: Option<Vec<String>>,
    /// Settings as JSON object text.
    pub settings: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SourceWire {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) slug: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) enabled: bool,
    #[serde(default)]
    pub(crate) workspace_id: Option<String>,
    #[serde(default)]
    pub(crate) write_keys: Vec<String>,
    #[serde(default)]
    pub(crate) metadata: Option<MetadataRef>,
    #[serde(default)]
    pub(crate) settings: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetadataRef {
    pub(crate) id: String,
}

impl SourceWire {
    /// Map into state, with `settings` already chosen by the caller.
    pub(crate) fn into_state(self, settings: Option<String>) -> SourceState {
        SourceState {
            id: Some(self.id),
            slug: self.slug,
            name: self.name.unwrap_or_default(),
            enabled: self.enabled,
            metadata_id: self.metadata.map(|m| m.id).unwrap_or_default(),
            workspace_id: self.workspace_id,
            write_keys: Some(self.write_keys),
            settings,
        }
    }
}

/// The `segment_source` resource.
pub struct Source {
    api: Arc<dyn Api>,
}

impl Source {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for Source {
    type State = SourceState;

    const TYPE_NAME: &'static str = "segment_source";
    const DISPLAY_NAME: &'static str = "source";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("source_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Segment source.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "slug",
                Attribute::required_string().with_description("Slug of the source."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute(
                "metadata_id",
                Attribute::required_string()
                    .with_description("Catalog id of the source type.")
                    .with_force_new(),
            )
            .with_attribute("workspace_id", Attribute::computed_string())
            .with_attribute(
                "write_keys",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                )
                .sensitive(),
            )
            .with_attribute(
                "settings",
                Attribute::optional_json().with_description("Source settings as JSON text."),
            )
    }

    fn from_import(id: &ImportId) -> SourceState {
        SourceState {
            id: Some(id.first().to_string()),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &SourceState) -> Result<SourceState, ResourceError> {
        let settings = plan_settings(plan.settings.as_deref(), "settings")?;
        let response = self
            .api
            .send(ApiRequest::post("/sources").with_body(json!({
                "slug": plan.slug,
                "enabled": plan.enabled,
                "metadataId": plan.metadata_id,
                "settings": settings,
            })))
            .await?;
        let created: SourceWire = extract(&response, "source")?;

        let response = self
            .api
            .send(
                ApiRequest::patch(format!("/sources/{}", segment(&created.id)))
                    .with_body(json!({"name": plan.name})),
            )
            .await?;
        let source: SourceWire = extract(&response, "source")?;
        Ok(source.into_state(plan.settings.clone()))
    }

    async fn read(&self, state: &SourceState) -> Result<SourceState, ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        let response = self.api.send(ApiRequest::get(format!("/sources/{}", segment(id)))).await?;
        let source: SourceWire = extract(&response, "source")?;
        let settings = settings::reconcile(state.settings.as_deref(), &source.settings);
        Ok(source.into_state(settings))
    }

    async fn update(
        &self,
        plan: &SourceState,
        prior: &SourceState,
    ) -> Result<SourceState, ResourceError> {
        let path = format!("/sources/{}", segment(required(prior.id.as_deref(), "id")?));
        let settings = settings_update(
            self.api.as_ref(),
            &path,
            "/data/source/settings",
            plan.settings.as_deref(),
        )
        .await?;
        let response = self
            .api
            .send(ApiRequest::patch(&path).with_body(json!({
                "slug": plan.slug,
                "name": plan.name,
                "enabled": plan.enabled,
                "settings": settings,
            })))
            .await?;
        let source: SourceWire = extract(&response, "source")?;
        Ok(source.into_state(plan.settings.clone()))
    }

    async fn delete(&self, state: &SourceState) -> Result<(), ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        self.api
            .send(ApiRequest::delete(format!("/sources/{}", segment(id))))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SegmentProvider;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::{ProviderTester, ScriptedApi};

    fn source_body(name: &str, settings: Value) -> Value {
        json!({"data": {"source": {
            "id": "src_1",
            "slug": "web",
            "name": name,
            "enabled": true,
            "workspaceId": "ws_1",
            "writeKeys": ["wk_1"],
            "metadata": {"id": "meta_js", "name": "Javascript"},
            "settings": settings,
        }}})
    }

    fn adapter(api: &Arc<ScriptedApi>) -> ResourceAdapter<Source> {
        ResourceAdapter::new(Source::new(api.clone()))
    }

    fn plan(settings: &str) -> Value {
        json!({
            "slug": "web",
            "name": "Website",
            "enabled": true,
            "metadata_id": "meta_js",
            "settings": settings,
        })
    }

    #[tokio::test]
    async fn test_create_sets_name_in_second_step() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("POST", "/sources", 200, source_body("", json!({})));
        // the remote fills in a default the plan never declared
        api.respond(
            "PATCH",
            "/sources/src_1",
            200,
            source_body("Website", json!({"apiKey": "k", "trackAll": false})),
        );

        let state = adapter(&api).create(plan(r#"{"apiKey":"k"}"#)).await.unwrap();

        assert_eq!(
            api.last_body("POST", "/sources"),
            Some(json!({"slug": "web", "enabled": true, "metadataId": "meta_js", "settings": {"apiKey": "k"}}))
        );
        assert_eq!(api.last_body("PATCH", "/sources/src_1"), Some(json!({"name": "Website"})));
        assert_eq!(state["id"], "src_1");
        assert_eq!(state["name"], "Website");
        assert_eq!(state["write_keys"], json!(["wk_1"]));
        assert_eq!(state["settings"], r#"{"apiKey":"k"}"#);
    }

    #[tokio::test]
    async fn test_create_then_read_is_stable() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("POST", "/sources", 200, source_body("", json!({})));
        api.respond("PATCH", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k"})));
        api.respond("GET", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k"})));

        let adapter = adapter(&api);
        let created = adapter.create(plan(r#"{ "apiKey": "k" }"#)).await.unwrap();
        let read = adapter.read(created.clone()).await.unwrap();

        assert_eq!(read, Some(created));
    }

    #[tokio::test]
    async fn test_update_nulls_removed_settings_keys() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/sources/src_1",
            200,
            source_body("Website", json!({"apiKey": "k", "legacy": true})),
        );
        api.respond("PATCH", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k2"})));

        let prior = json!({"id": "src_1", "slug": "web", "name": "Website", "enabled": true,
            "metadata_id": "meta_js", "settings": r#"{"apiKey":"k","legacy":true}"#});
        let state = adapter(&api)
            .update(prior, plan(r#"{"apiKey":"k2"}"#))
            .await
            .unwrap();

        let body = api.last_body("PATCH", "/sources/src_1").unwrap();
        assert_eq!(body["settings"], json!({"apiKey": "k2", "legacy": null}));
        assert_eq!(state["settings"], r#"{"apiKey":"k2"}"#);
    }

    #[tokio::test]
    async fn test_read_keeps_prior_settings_when_remote_unset() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/sources/src_1", 200, source_body("Website", Value::Null));

        let state = adapter(&api)
            .read(json!({"id": "src_1", "settings": r#"{"apiKey":"k"}"#}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["settings"], r#"{"apiKey":"k"}"#);
    }

    #[tokio::test]
    async fn test_read_missing_source_removes_it() {
        let api = Arc::new(ScriptedApi::new());
        api.respond_not_found("GET", "/sources/src_1");

        let state = adapter(&api).read(json!({"id": "src_1"})).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_invalid_settings_make_no_remote_call() {
        let api = Arc::new(ScriptedApi::new());
        let err = adapter(&api).create(plan("[1,2]")).await.unwrap_err();

        assert_eq!(err.diagnostics()[0].attribute.as_deref(), Some("settings"));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_import_then_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k"})));

        let adapter = adapter(&api);
        let seeded = adapter.import("src_1").unwrap();
        let state = adapter.read(seeded).await.unwrap().unwrap();

        assert_eq!(state["slug"], "web");
        assert_eq!(state["metadata_id"], "meta_js");
        assert_eq!(state["settings"], r#"{"apiKey":"k"}"#);
    }

    #[tokio::test]
    async fn test_delete() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("DELETE", "/sources/src_1", 200, json!({"data": {"status": "SUCCESS"}}));

        adapter(&api).delete(json!({"id": "src_1"})).await.unwrap();
        assert_eq!(api.requests_to("DELETE", "/sources/src_1").len(), 1);
    }

    #[tokio::test]
    async fn test_removed_key_absent_after_next_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/sources/src_1",
            200,
            source_body("Website", json!({"apiKey": "k", "legacy": true})),
        );
        api.respond("GET", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k2"})));
        api.respond("PATCH", "/sources/src_1", 200, source_body("Website", json!({"apiKey": "k2"})));

        let tester = ProviderTester::new(SegmentProvider::with_api(api.clone()));
        let prior = json!({"id": "src_1", "slug": "web", "name": "Website", "enabled": true,
            "metadata_id": "meta_js", "settings": r#"{"apiKey":"k","legacy":true}"#});
        let read = tester
            .update_then_read("segment_source", prior, plan(r#"{"apiKey":"k2"}"#))
            .await
            .unwrap()
            .unwrap();

        let settings = crate::settings::decode(read["settings"].as_str().unwrap()).unwrap();
        assert!(!settings.contains_key("legacy"));
        assert_eq!(settings["apiKey"], "k2");
    }
}
