//! The Segment provider: one-shot configuration plus dispatch by type name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::client::{Api, HttpClient};
use crate::config::ProviderConfig;
use crate::data_sources;
use crate::error::ProviderError;
use crate::resource::{DynDataSource, DynResource};
use crate::resources;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::{ImportedResource, ProviderService};
use crate::validation;

/// Resource and data source implementations bound to one API handle.
struct Registry {
    resources: HashMap<&'static str, Box<dyn DynResource>>,
    data_sources: HashMap<&'static str, Box<dyn DynDataSource>>,
}

impl Registry {
    fn new(api: Arc<dyn Api>) -> Self {
        Self {
            resources: resources::all(&api)
                .into_iter()
                .map(|r| (r.type_name(), r))
                .collect(),
            data_sources: data_sources::all(&api)
                .into_iter()
                .map(|d| (d.type_name(), d))
                .collect(),
        }
    }
}

/// Provider for the Segment Public API.
///
/// Configure builds the HTTP client and the registry exactly once; every
/// later call only reads them.
#[derive(Default)]
pub struct SegmentProvider {
    registry: OnceCell<Registry>,
}

impl SegmentProvider {
    /// An unconfigured provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider already configured against `api`.
    pub fn with_api(api: Arc<dyn Api>) -> Self {
        Self {
            registry: OnceCell::new_with(Some(Registry::new(api))),
        }
    }

    fn registry(&self) -> Result<&Registry, ProviderError> {
        self.registry.get().ok_or(ProviderError::NotConfigured)
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn DynResource, ProviderError> {
        self.registry()?
            .resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| unknown_resource(resource_type))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DynDataSource, ProviderError> {
        self.registry()?
            .data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| unknown_data_source(data_source_type))
    }
}

fn unknown_resource(resource_type: &str) -> ProviderError {
    ProviderError::UnknownResource(format!("Unknown resource type: {}", resource_type))
}

fn unknown_data_source(data_source_type: &str) -> ProviderError {
    ProviderError::UnknownResource(format!("Unknown data source type: {}", data_source_type))
}

fn already_configured() -> Vec<Diagnostic> {
    vec![Diagnostic::warning("Provider is already configured")
        .with_detail("The configuration supplied again was ignored.")]
}

#[async_trait::async_trait]
impl ProviderService for SegmentProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = resources::types()
            .into_iter()
            .fold(schema, |schema, t| schema.with_resource(t.name, (t.schema)()));
        data_sources::schemas()
            .into_iter()
            .fold(schema, |schema, (name, s)| schema.with_data_source(name, s))
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(ProviderConfig::validate(&config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.registry.initialized() {
            warn!("Configure called again, ignoring");
            return Ok(already_configured());
        }

        let config = ProviderConfig::from_value(&config)?;
        info!(url = %config.url, "Configuring Segment provider");
        let client: Arc<dyn Api> = Arc::new(HttpClient::new(config.url, config.token));

        // Two concurrent Configure calls: the loser is reported like a second call.
        match self.registry.set(Registry::new(client)) {
            Ok(()) => Ok(vec![]),
            Err(_) => Ok(already_configured()),
        }
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        resources::find(resource_type)
            .map(|t| (t.validate)(&config))
            .ok_or_else(|| unknown_resource(resource_type))
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.create(planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.resource(resource_type)?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type)?.delete(current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self.resource(resource_type)?.import(id)?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        data_sources::schemas()
            .into_iter()
            .find(|(name, _)| *name == data_source_type)
            .map(|(_, schema)| validation::validate(&schema, &config))
            .ok_or_else(|| unknown_data_source(data_source_type))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.data_source(data_source_type)?.read(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_error_contains, ProviderTester, ScriptedApi};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_schema_lists_every_type() {
        let metadata = SegmentProvider::new().metadata();
        assert_eq!(metadata.resources.len(), 10);
        assert!(metadata.resources.contains(&"segment_destination_filter".to_string()));
        assert_eq!(
            metadata.data_sources,
            vec!["segment_destination_metadata", "segment_source"]
        );
        assert!(SegmentProvider::new().schema().provider.attributes["token"]
            .flags
            .sensitive);
    }

    #[tokio::test]
    async fn test_calls_before_configure_fail() {
        let tester = ProviderTester::new(SegmentProvider::new());
        let err = tester
            .read("segment_source", json!({"id": "src_1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));

        // validation is local and works before Configure
        let diagnostics = tester
            .provider()
            .validate_resource_config("segment_label", json!({"key": "env"}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        let err = tester
            .validate_resource_config(
                "segment_destination_filter",
                json!({"destination_id": "d", "source_id": "s", "if": "all", "title": "t",
                    "enabled": true, "actions": [{"type": "DROP", "percent": 0.5}]}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'percent' is not allowed"));
    }

    #[tokio::test]
    async fn test_second_configure_warns() {
        let provider = SegmentProvider::new();
        let first = provider
            .configure(json!({"url": "http://localhost:1", "token": "t"}))
            .await
            .unwrap();
        assert!(first.is_empty());

        let second = provider
            .configure(json!({"url": "http://localhost:2", "token": "t2"}))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(!second[0].is_error());
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let provider = SegmentProvider::with_api(Arc::new(ScriptedApi::new()));
        assert!(matches!(
            provider.create("segment_space", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
        assert!(matches!(
            provider.read_data_source("segment_space", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_import_returns_seeded_state() {
        let tester = ProviderTester::new(SegmentProvider::with_api(Arc::new(ScriptedApi::new())));
        let state = tester
            .import("segment_destination_filter", "dst_1:flt_1")
            .await
            .unwrap();
        assert_eq!(state["destination_id"], "dst_1");
        assert_eq!(state["id"], "flt_1");

        let err = tester
            .import("segment_destination_filter", "dst_1")
            .await
            .unwrap_err();
        assert_error_contains(&err, "Invalid import identifier");
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/labels"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_json(json!({"label": {"key": "env", "value": "prod"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"label": {"key": "env", "value": "prod"}}}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"labels": [{"key": "env", "value": "prod"}], "pagination": {}}}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/labels/env:prod"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"errors": [{"type": "not-found", "message": "Label not found"}]}),
            ))
            .mount(&server)
            .await;

        let tester = ProviderTester::new(SegmentProvider::new());
        tester
            .configure(json!({"url": server.uri(), "token": "secret-token"}))
            .await
            .unwrap();

        let (created, read) = tester
            .create_then_read("segment_label", json!({"key": "env", "value": "prod"}))
            .await
            .unwrap();
        assert_eq!(read, Some(created.clone()));

        // deleted elsewhere already
        tester.delete("segment_label", created).await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_as_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sources/src_1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({"errors": [{"type": "forbidden", "message": "token lacks access"}]}),
            ))
            .mount(&server)
            .await;

        let provider = SegmentProvider::new();
        provider
            .configure(json!({"url": server.uri(), "token": "t"}))
            .await
            .unwrap();

        let err = provider
            .read("segment_source", json!({"id": "src_1"}))
            .await
            .unwrap_err();
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics[0].summary, "Unable to read source");
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("token lacks access (HTTP 403)")
        );
    }
}
