//! `segment_warehouse`: a warehouse connection of the workspace.
//!
//! The API stores the display name as `settings.name`. That key belongs to the
//! `name` attribute unless the plan's settings declare it themselves.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{required, settings_update};
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{extract, plan_settings, Resource, ResourceError};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::settings;

/// Plan and state of a warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseState {
    /// Remote identifier.
    pub id: Option<String>,
    /// Catalog entry of the warehouse kind.
    pub metadata_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Whether syncs run.
    pub enabled: bool,
    /// Owning workspace.
    pub workspace_id: Option<String>,
    /// Connection settings as JSON object text.
    pub settings: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WarehouseWire {
    id: String,
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    metadata: Option<MetadataRef>,
    #[serde(default)]
    settings: Value,
}

#[derive(Debug, Deserialize)]
struct MetadataRef {
    id: String,
}

fn declares_name(settings: Option<&str>) -> bool {
    settings::decode_optional(settings).is_ok_and(|map| map.contains_key("name"))
}

impl WarehouseWire {
    /// The remote name, and the remote settings as the plan sees them.
    fn split_name(&self, declared: Option<&str>) -> (Option<String>, Value) {
        let name = self
            .settings
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut settings = self.settings.clone();
        if !declares_name(declared) {
            if let Some(map) = settings.as_object_mut() {
                map.remove("name");
            }
        }
        (name, settings)
    }

    fn into_state(self, name: Option<String>, settings: Option<String>) -> WarehouseState {
        WarehouseState {
            id: Some(self.id),
            metadata_id: self.metadata.map(|m| m.id).unwrap_or_default(),
            name,
            enabled: self.enabled,
            workspace_id: self.workspace_id,
            settings,
        }
    }
}

/// The `segment_warehouse` resource.
pub struct Warehouse {
    api: Arc<dyn Api>,
}

impl Warehouse {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for Warehouse {
    type State = WarehouseState;

    const TYPE_NAME: &'static str = "segment_warehouse";
    const DISPLAY_NAME: &'static str = "warehouse";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("warehouse_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Segment warehouse.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("metadata_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "name",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
            )
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute("workspace_id", Attribute::computed_string())
            .with_attribute("settings", Attribute::optional_json())
    }

    fn from_import(id: &ImportId) -> WarehouseState {
        WarehouseState {
            id: Some(id.first().to_string()),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &WarehouseState) -> Result<WarehouseState, ResourceError> {
        let settings = plan_settings(plan.settings.as_deref(), "settings")?;
        let response = self
            .api
            .send(ApiRequest::post("/warehouses").with_body(json!({
                "metadataId": plan.metadata_id,
                "name": plan.name,
                "enabled": plan.enabled,
                "settings": settings,
            })))
            .await?;
        let warehouse: WarehouseWire = extract(&response, "warehouse")?;
        let (remote_name, _) = warehouse.split_name(plan.settings.as_deref());
        let name = plan.name.clone().or(remote_name);
        Ok(warehouse.into_state(name, plan.settings.clone()))
    }

    async fn read(&self, state: &WarehouseState) -> Result<WarehouseState, ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        let response = self
            .api
            .send(ApiRequest::get(format!("/warehouses/{}", segment(id))))
            .await?;
        let warehouse: WarehouseWire = extract(&response, "warehouse")?;
        let (remote_name, remote_settings) = warehouse.split_name(state.settings.as_deref());
        let name = remote_name.or_else(|| state.name.clone());
        let settings = settings::reconcile(state.settings.as_deref(), &remote_settings);
        Ok(warehouse.into_state(name, settings))
    }

    async fn update(
        &self,
        plan: &WarehouseState,
        prior: &WarehouseState,
    ) -> Result<WarehouseState, ResourceError> {
        let path = format!("/warehouses/{}", segment(required(prior.id.as_deref(), "id")?));
        let mut settings = settings_update(
            self.api.as_ref(),
            &path,
            "/data/warehouse/settings",
            plan.settings.as_deref(),
        )
        .await?;
        if !declares_name(plan.settings.as_deref()) {
            settings.remove("name");
        }
        let response = self
            .api
            .send(ApiRequest::patch(&path).with_body(json!({
                "name": plan.name,
                "enabled": plan.enabled,
                "settings": settings,
            })))
            .await?;
        let warehouse: WarehouseWire = extract(&response, "warehouse")?;
        let (remote_name, _) = warehouse.split_name(plan.settings.as_deref());
        let name = plan.name.clone().or(remote_name);
        Ok(warehouse.into_state(name, plan.settings.clone()))
    }

    async fn delete(&self, state: &WarehouseState) -> Result<(), ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        self.api
            .send(ApiRequest::delete(format!("/warehouses/{}", segment(id))))
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

    fn warehouse_body(settings: Value) -> Value {
        json!({"data": {"warehouse": {
            "id": "wh_1",
            "workspaceId": "ws_1",
            "enabled": true,
            "metadata": {"id": "meta_pg"},
            "settings": settings,
        }}})
    }

    #[tokio::test]
    async fn test_update_sends_removal_patch() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db", "ssl": true})),
        );
        api.respond(
            "PATCH",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db2"})),
        );

        let adapter = ResourceAdapter::new(Warehouse::new(api.clone()));
        let state = adapter
            .update(
                json!({"id": "wh_1", "metadata_id": "meta_pg", "name": "pg", "enabled": true,
                    "settings": r#"{"hostname":"db","name":"pg","ssl":true}"#}),
                json!({"id": "wh_1", "metadata_id": "meta_pg", "name": "pg", "enabled": true,
                    "settings": r#"{"hostname":"db2","name":"pg"}"#}),
            )
            .await
            .unwrap();

        assert_eq!(
            api.last_body("PATCH", "/warehouses/wh_1").unwrap()["settings"],
            json!({"hostname": "db2", "name": "pg", "ssl": null})
        );
        assert_eq!(state["workspace_id"], "ws_1");
    }

    #[tokio::test]
    async fn test_import_then_read_takes_name_from_settings() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/warehouses/wh_1", 200, warehouse_body(json!({"name": "pg"})));

        let adapter = ResourceAdapter::new(Warehouse::new(api.clone()));
        let state = adapter
            .read(adapter.import("wh_1").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["name"], "pg");
        assert_eq!(state["metadata_id"], "meta_pg");
    }

    fn plan(name: &str, settings: &str) -> Value {
        json!({"id": "wh_1", "metadata_id": "meta_pg", "name": name, "enabled": true,
            "settings": settings})
    }

    #[tokio::test]
    async fn test_create_then_read_with_name_outside_settings() {
        let api = Arc::new(ScriptedApi::new());
        let remote = warehouse_body(json!({"name": "pg", "hostname": "db"}));
        api.respond("POST", "/warehouses", 200, remote.clone());
        api.respond("GET", "/warehouses/wh_1", 200, remote);

        let adapter = ResourceAdapter::new(Warehouse::new(api.clone()));
        let created = adapter
            .create(json!({"metadata_id": "meta_pg", "name": "pg", "enabled": true,
                "settings": r#"{"hostname":"db"}"#}))
            .await
            .unwrap();

        assert_eq!(created["settings"], r#"{"hostname":"db"}"#);
        assert_eq!(adapter.read(created.clone()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_leaves_remote_name_to_name_attribute() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db"})),
        );
        api.respond(
            "PATCH",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg2", "hostname": "db2"})),
        );

        let adapter = ResourceAdapter::new(Warehouse::new(api.clone()));
        let state = adapter
            .update(plan("pg", r#"{"hostname":"db"}"#), plan("pg2", r#"{"hostname":"db2"}"#))
            .await
            .unwrap();

        let body = api.last_body("PATCH", "/warehouses/wh_1").unwrap();
        assert_eq!(body["name"], "pg2");
        assert_eq!(body["settings"], json!({"hostname": "db2"}));
        assert_eq!(state["name"], "pg2");
    }

    #[tokio::test]
    async fn test_read_detects_remote_rename() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "renamed", "hostname": "db"})),
        );

        let adapter = ResourceAdapter::new(Warehouse::new(api.clone()));
        let state = adapter
            .read(plan("pg", r#"{"hostname":"db"}"#))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["name"], "renamed");
        assert_eq!(state["settings"], r#"{"hostname":"db"}"#);
    }

    #[tokio::test]
    async fn test_removed_key_absent_after_next_read() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db", "ssl": true})),
        );
        api.respond(
            "GET",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db"})),
        );
        api.respond(
            "PATCH",
            "/warehouses/wh_1",
            200,
            warehouse_body(json!({"name": "pg", "hostname": "db"})),
        );

        let tester = ProviderTester::new(SegmentProvider::with_api(api.clone()));
        let read = tester
            .update_then_read(
                "segment_warehouse",
                plan("pg", r#"{"hostname":"db","ssl":true}"#),
                plan("pg", r#"{"hostname":"db"}"#),
            )
            .await
            .unwrap()
            .unwrap();

        let body = api.last_body("PATCH", "/warehouses/wh_1").unwrap();
        assert_eq!(body["settings"], json!({"hostname": "db", "ssl": null}));
        let settings = settings::decode(read["settings"].as_str().unwrap()).unwrap();
        assert!(!settings.contains_key("ssl"));
        assert_eq!(read["name"], "pg");
    }
}
