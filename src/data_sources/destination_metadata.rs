//! `segment_destination_metadata` data source: a destination catalog entry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::{segment, Api, ApiRequest};
use crate::resource::{extract, DataSource, ResourceError};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Lookup arguments.
#[derive(Debug, Deserialize)]
pub struct DestinationMetadataConfig {
    /// Catalog id.
    pub id: String,
}

/// A destination catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationMetadataState {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Catalog slug.
    pub slug: String,
    /// Description.
    pub description: Option<String>,
    /// Vendor website.
    pub website: Option<String>,
    /// Release status, e.g. `PUBLIC`.
    pub status: Option<String>,
    /// Catalog categories.
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
}

/// The `segment_destination_metadata` data source.
pub struct DestinationMetadataLookup {
    api: Arc<dyn Api>,
}

impl DestinationMetadataLookup {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DataSource for DestinationMetadataLookup {
    type Config = DestinationMetadataConfig;
    type State = DestinationMetadataState;

    const TYPE_NAME: &'static str = "segment_destination_metadata";
    const DISPLAY_NAME: &'static str = "destination metadata";

    fn schema() -> Schema {
        Schema::v0()
            .with_description("Looks up a destination in the Segment catalog.")
            .with_attribute("id", Attribute::required_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("slug", Attribute::computed_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("website", Attribute::computed_string())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute(
                "categories",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            )
    }

    async fn read(
        &self,
        config: &DestinationMetadataConfig,
    ) -> Result<DestinationMetadataState, ResourceError> {
        let response = self
            .api
            .send(ApiRequest::get(format!("/catalog/destinations/{}", segment(&config.id))))
            .await?;
        let wire: MetadataWire = extract(&response, "destinationMetadata")?;
        Ok(DestinationMetadataState {
            id: wire.id,
            name: wire.name,
            slug: wire.slug,
            description: wire.description,
            website: wire.website,
            status: wire.status,
            categories: wire.categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::resource::{DataSourceAdapter, DynDataSource};
    use crate::testing::ScriptedApi;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_catalog_entry() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/catalog/destinations/meta_amp",
            200,
            json!({"data": {"destinationMetadata": {
                "id": "meta_amp",
                "name": "Amplitude",
                "slug": "amplitude",
                "status": "PUBLIC",
                "categories": ["Analytics"],
                "logos": {"default": "https://cdn.segment.test/amp.svg"},
            }}}),
        );

        let lookup = DataSourceAdapter::new(DestinationMetadataLookup::new(api.clone()));
        let state = lookup.read(json!({"id": "meta_amp"})).await.unwrap();

        assert_eq!(state["slug"], "amplitude");
        assert_eq!(state["categories"], json!(["Analytics"]));
        assert!(state["website"].is_null());
    }

    #[tokio::test]
    async fn test_malformed_response_is_a_population_error() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/catalog/destinations/meta_amp", 200, json!({"data": {}}));

        let lookup = DataSourceAdapter::new(DestinationMetadataLookup::new(api.clone()));
        let err = lookup.read(json!({"id": "meta_amp"})).await.unwrap_err();

        assert!(matches!(err, ProviderError::StatePopulation { .. }));
        assert_eq!(
            err.diagnostics()[0].summary,
            "Unable to populate destination metadata state"
        );
    }
}
