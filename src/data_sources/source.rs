//! `segment_source` data source: look up an existing source by id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{segment, Api, ApiRequest};
use crate::resource::{extract, DataSource, ResourceError};
use crate::resources::source::{SourceState, SourceWire};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::settings;

/// Lookup arguments.
#[derive(Debug, Deserialize)]
pub struct SourceLookupConfig {
    /// Source id.
    pub id: String,
}

/// The `segment_source` data source.
pub struct SourceLookup {
    api: Arc<dyn Api>,
}

impl SourceLookup {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DataSource for SourceLookup {
    type Config = SourceLookupConfig;
    type State = SourceState;

    const TYPE_NAME: &'static str = "segment_source";
    const DISPLAY_NAME: &'static str = "source";

    fn schema() -> Schema {
        Schema::v0()
            .with_description("Looks up a Segment source by id.")
            .with_attribute("id", Attribute::required_string())
            .with_attribute("slug", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("enabled", Attribute::computed_bool())
            .with_attribute("metadata_id", Attribute::computed_string())
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
                Attribute::new(AttributeType::Json, AttributeFlags::computed()),
            )
    }

    async fn read(&self, config: &SourceLookupConfig) -> Result<SourceState, ResourceError> {
        let response = self
            .api
            .send(ApiRequest::get(format!("/sources/{}", segment(&config.id))))
            .await?;
        let source: SourceWire = extract(&response, "source")?;
        let settings = settings::reconcile(None, &source.settings);
        Ok(source.into_state(settings))
    }
}
