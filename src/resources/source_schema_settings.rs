//! `segment_source_schema_settings`: schema controls of a source.
//!
//! The settings object always exists on its source. Create and update both
//! write it; delete only stops tracking it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{required, settings_update};
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{Resource, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::settings;

/// Plan and state of a source's schema settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSchemaSettingsState {
    /// Source the settings belong to.
    pub source_id: String,
    /// Settings as JSON object text, e.g. `{"track":{"allowUnplannedEvents":true}}`.
    pub settings: Option<String>,
}

/// The `segment_source_schema_settings` resource.
pub struct SourceSchemaSettings {
    api: Arc<dyn Api>,
}

impl SourceSchemaSettings {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }

    async fn write(
        &self,
        plan: &SourceSchemaSettingsState,
    ) -> Result<SourceSchemaSettingsState, ResourceError> {
        let source_id = required(Some(&plan.source_id), "source_id")?;
        let path = format!("/sources/{}/settings", segment(source_id));
        let patch = settings_update(
            self.api.as_ref(),
            &path,
            "/data/settings",
            plan.settings.as_deref(),
        )
        .await?;
        self.api
            .send(ApiRequest::patch(&path).with_body(Value::Object(patch)))
            .await?;
        Ok(plan.clone())
    }
}

#[async_trait]
impl Resource for SourceSchemaSettings {
    type State = SourceSchemaSettingsState;

    const TYPE_NAME: &'static str = "segment_source_schema_settings";
    const DISPLAY_NAME: &'static str = "source schema settings";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("source_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("Schema settings of a Segment source.")
            .with_attribute("source_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "settings",
                Attribute::optional_json()
                    .with_description("Schema settings as JSON text (track, identify, group)."),
            )
    }

    fn from_import(id: &ImportId) -> SourceSchemaSettingsState {
        SourceSchemaSettingsState {
            source_id: id.first().to_string(),
            settings: None,
        }
    }

    async fn create(
        &self,
        plan: &SourceSchemaSettingsState,
    ) -> Result<SourceSchemaSettingsState, ResourceError> {
        self.write(plan).await
    }

    async fn read(
        &self,
        state: &SourceSchemaSettingsState,
    ) -> Result<SourceSchemaSettingsState, ResourceError> {
        let source_id = required(Some(&state.source_id), "source_id")?;
        let response = self
            .api
            .send(ApiRequest::get(format!("/sources/{}/settings", segment(source_id))))
            .await?;
        let remote = response.data("settings").cloned().unwrap_or(Value::Null);
        Ok(SourceSchemaSettingsState {
            source_id: state.source_id.clone(),
            settings: settings::reconcile(state.settings.as_deref(), &remote),
        })
    }

    async fn update(
        &self,
        plan: &SourceSchemaSettingsState,
        _prior: &SourceSchemaSettingsState,
    ) -> Result<SourceSchemaSettingsState, ResourceError> {
        self.write(plan).await
    }

    async fn delete(&self, _state: &SourceSchemaSettingsState) -> Result<(), ResourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SegmentProvider;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::{ProviderTester, ScriptedApi};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_patches_with_removals() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/sources/src_1/settings",
            200,
            json!({"data": {"settings": {"track": {"allowUnplannedEvents": true}, "forwardingViolationsTo": "src_2"}}}),
        );
        api.respond("PATCH", "/sources/src_1/settings", 200, json!({"data": {}}));

        let adapter = ResourceAdapter::new(SourceSchemaSettings::new(api.clone()));
        let state = adapter
            .create(json!({
                "source_id": "src_1",
                "settings": r#"{"track":{"allowUnplannedEvents":false}}"#,
            }))
            .await
            .unwrap();

        assert_eq!(
            api.last_body("PATCH", "/sources/src_1/settings"),
            Some(json!({"track": {"allowUnplannedEvents": false}, "forwardingViolationsTo": null}))
        );
        assert_eq!(state["settings"], r#"{"track":{"allowUnplannedEvents":false}}"#);
    }

    #[tokio::test]
    async fn test_delete_is_local_only() {
        let api = Arc::new(ScriptedApi::new());
        let adapter = ResourceAdapter::new(SourceSchemaSettings::new(api.clone()));

        adapter.delete(json!({"source_id": "src_1"})).await.unwrap();
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_import_then_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/sources/src_1/settings",
            200,
            json!({"data": {"settings": {"identify": {"allowTraitsOnViolations": true}}}}),
        );

        let adapter = ResourceAdapter::new(SourceSchemaSettings::new(api.clone()));
        let state = adapter
            .read(adapter.import("src_1").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["source_id"], "src_1");
        assert_eq!(state["settings"], r#"{"identify":{"allowTraitsOnViolations":true}}"#);
    }

    #[tokio::test]
    async fn test_removed_key_absent_after_next_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/sources/src_1/settings",
            200,
            json!({"data": {"settings": {"track": {"allowUnplannedEvents": true}, "group": {}}}}),
        );
        api.respond(
            "GET",
            "/sources/src_1/settings",
            200,
            json!({"data": {"settings": {"track": {"allowUnplannedEvents": false}}}}),
        );
        api.respond("PATCH", "/sources/src_1/settings", 200, json!({"data": {}}));

        let tester = ProviderTester::new(SegmentProvider::with_api(api.clone()));
        let read = tester
            .update_then_read(
                "segment_source_schema_settings",
                json!({"source_id": "src_1",
                    "settings": r#"{"group":{},"track":{"allowUnplannedEvents":true}}"#}),
                json!({"source_id": "src_1",
                    "settings": r#"{"track":{"allowUnplannedEvents":false}}"#}),
            )
            .await
            .unwrap()
            .unwrap();

        let patch = api.last_body("PATCH", "/sources/src_1/settings").unwrap();
        assert_eq!(patch.get("group"), Some(&Value::Null));
        let settings = settings::decode(read["settings"].as_str().unwrap()).unwrap();
        assert!(!settings.contains_key("group"));
    }
}
