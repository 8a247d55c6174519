//! `segment_source_warehouse_connection`: a source syncing into a warehouse.
//!
//! The connection has no attributes of its own; changing either side replaces
//! it. Its existence is read from the warehouse's connected-sources listing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::required;
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::pagination;
use crate::resource::{Resource, ResourceError};
use crate::schema::{Attribute, Schema};

/// Plan and state of a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionState {
    /// Warehouse side.
    pub warehouse_id: String,
    /// Source side.
    pub source_id: String,
}

#[derive(Debug, Deserialize)]
struct ConnectedSource {
    id: String,
}

/// The `segment_source_warehouse_connection` resource.
pub struct SourceWarehouseConnection {
    api: Arc<dyn Api>,
}

impl SourceWarehouseConnection {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }

    fn path(state: &ConnectionState) -> Result<String, ResourceError> {
        let warehouse_id = required(Some(&state.warehouse_id), "warehouse_id")?;
        let source_id = required(Some(&state.source_id), "source_id")?;
        Ok(format!(
            "/warehouses/{}/connected-sources/{}",
            segment(warehouse_id),
            segment(source_id)
        ))
    }
}

#[async_trait]
impl Resource for SourceWarehouseConnection {
    type State = ConnectionState;

    const TYPE_NAME: &'static str = "segment_source_warehouse_connection";
    const DISPLAY_NAME: &'static str = "source warehouse connection";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Pair("warehouse_id", "source_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("Connects a Segment source to a warehouse.")
            .with_attribute("warehouse_id", Attribute::required_string().with_force_new())
            .with_attribute("source_id", Attribute::required_string().with_force_new())
    }

    fn from_import(id: &ImportId) -> ConnectionState {
        ConnectionState {
            warehouse_id: id.first().to_string(),
            source_id: id.second().to_string(),
        }
    }

    async fn create(&self, plan: &ConnectionState) -> Result<ConnectionState, ResourceError> {
        self.api.send(ApiRequest::post(Self::path(plan)?)).await?;
        Ok(plan.clone())
    }

    async fn read(&self, state: &ConnectionState) -> Result<ConnectionState, ResourceError> {
        let warehouse_id = required(Some(&state.warehouse_id), "warehouse_id")?;
        let sources: Vec<ConnectedSource> = pagination::list_all(
            self.api.as_ref(),
            &format!("/warehouses/{}/connected-sources", segment(warehouse_id)),
            "sources",
        )
        .await?;
        if sources.iter().any(|source| source.id == state.source_id) {
            Ok(state.clone())
        } else {
            Err(ResourceError::Gone(format!(
                "connection of source {} to warehouse {}",
                state.source_id, warehouse_id
            )))
        }
    }

    // Every attribute forces replacement, so the plan can only equal the prior state.
    async fn update(
        &self,
        plan: &ConnectionState,
        _prior: &ConnectionState,
    ) -> Result<ConnectionState, ResourceError> {
        Ok(plan.clone())
    }

    async fn delete(&self, state: &ConnectionState) -> Result<(), ResourceError> {
        self.api.send(ApiRequest::delete(Self::path(state)?)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::ScriptedApi;
    use serde_json::json;

    fn adapter(api: &Arc<ScriptedApi>) -> ResourceAdapter<SourceWarehouseConnection> {
        ResourceAdapter::new(SourceWarehouseConnection::new(api.clone()))
    }

    #[tokio::test]
    async fn test_read_finds_source_on_second_page() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1/connected-sources",
            200,
            json!({"data": {"sources": [{"id": "src_0"}], "pagination": {"next": "p2"}}}),
        );
        api.respond(
            "GET",
            "/warehouses/wh_1/connected-sources",
            200,
            json!({"data": {"sources": [{"id": "src_1"}], "pagination": {}}}),
        );

        let state = json!({"warehouse_id": "wh_1", "source_id": "src_1"});
        let read = adapter(&api).read(state.clone()).await.unwrap();

        assert_eq!(read, Some(state));
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_read_unlisted_source_removes_connection() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/warehouses/wh_1/connected-sources",
            200,
            json!({"data": {"sources": [{"id": "src_0"}]}}),
        );

        let read = adapter(&api)
            .read(json!({"warehouse_id": "wh_1", "source_id": "src_1"}))
            .await
            .unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("POST", "/warehouses/wh_1/connected-sources/src_1", 200, json!({"data": {}}));
        api.respond_not_found("DELETE", "/warehouses/wh_1/connected-sources/src_1");

        let adapter = adapter(&api);
        let state = adapter
            .create(json!({"warehouse_id": "wh_1", "source_id": "src_1"}))
            .await
            .unwrap();
        assert_eq!(state["source_id"], "src_1");

        // already disconnected remotely
        tokio_test::assert_ok!(adapter.delete(state).await);
    }

    #[test]
    fn test_import_pair() {
        let api = Arc::new(ScriptedApi::new());
        let state = adapter(&api).import("wh_1:src_1").unwrap();
        assert_eq!(state, json!({"warehouse_id": "wh_1", "source_id": "src_1"}));
        assert!(adapter(&api).import("wh_1:").is_err());
    }
}
