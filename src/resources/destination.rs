//! `segment_destination`: a destination attached to a source.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{required, settings_update};
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{extract, plan_settings, Resource, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::settings;

/// Plan and state of a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationState {
    /// Remote identifier.
    pub id: Option<String>,
    /// Source the destination receives events from.
    pub source_id: String,
    /// Catalog entry the destination is an instance of.
    pub metadata_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Whether events are delivered.
    pub enabled: bool,
    /// Settings as JSON object text.
    pub settings: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationWire {
    id: String,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    name: Option<String>,
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

impl DestinationWire {
    fn into_state(self, settings: Option<String>) -> DestinationState {
        DestinationState {
            id: Some(self.id),
            source_id: self.source_id,
            metadata_id: self.metadata.map(|m| m.id).unwrap_or_default(),
            name: self.name,
            enabled: self.enabled,
            settings,
        }
    }
}

/// The `segment_destination` resource.
pub struct Destination {
    api: Arc<dyn Api>,
}

impl Destination {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for Destination {
    type State = DestinationState;

    const TYPE_NAME: &'static str = "segment_destination";
    const DISPLAY_NAME: &'static str = "destination";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("destination_id");

    fn schema() -> Schema {
        Schema::v0()
            .with_description("A Segment destination.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("source_id", Attribute::required_string().with_force_new())
            .with_attribute("metadata_id", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::optional_string())
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute("settings", Attribute::optional_json())
    }

    fn from_import(id: &ImportId) -> DestinationState {
        DestinationState {
            id: Some(id.first().to_string()),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &DestinationState) -> Result<DestinationState, ResourceError> {
        let settings = plan_settings(plan.settings.as_deref(), "settings")?;
        let response = self
            .api
            .send(ApiRequest::post("/destinations").with_body(json!({
                "sourceId": plan.source_id,
                "metadataId": plan.metadata_id,
                "name": plan.name,
                "enabled": plan.enabled,
                "settings": settings,
            })))
            .await?;
        let destination: DestinationWire = extract(&response, "destination")?;
        Ok(destination.into_state(plan.settings.clone()))
    }

    async fn read(&self, state: &DestinationState) -> Result<DestinationState, ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        let response = self
            .api
            .send(ApiRequest::get(format!("/destinations/{}", segment(id))))
            .await?;
        let destination: DestinationWire = extract(&response, "destination")?;
        let settings = settings::reconcile(state.settings.as_deref(), &destination.settings);
        Ok(destination.into_state(settings))
    }

    async fn update(
        &self,
        plan: &DestinationState,
        prior: &DestinationState,
    ) -> Result<DestinationState, ResourceError> {
        let path = format!("/destinations/{}", segment(required(prior.id.as_deref(), "id")?));
        let settings = settings_update(
            self.api.as_ref(),
            &path,
            "/data/destination/settings",
            plan.settings.as_deref(),
        )
        .await?;
        let response = self
            .api
            .send(ApiRequest::patch(&path).with_body(json!({
                "name": plan.name,
                "enabled": plan.enabled,
                "settings": settings,
            })))
            .await?;
        let destination: DestinationWire = extract(&response, "destination")?;
        Ok(destination.into_state(plan.settings.clone()))
    }

    async fn delete(&self, state: &DestinationState) -> Result<(), ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        self.api
            .send(ApiRequest::delete(format!("/destinations/{}", segment(id))))
            .await?;
        Ok(())
    }
}
