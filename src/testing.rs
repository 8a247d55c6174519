//! Testing utilities for provider and resource implementations.
//!
//! - [`ScriptedApi`] stands in for the remote API: it serves queued responses
//!   per method and path and records every request it receives.
//! - [`ProviderTester`] drives any [`ProviderService`] without an engine.
//!
//! # Example
//!
//! ```ignore
//! use segment_provider::testing::{ProviderTester, ScriptedApi};
//! use segment_provider::SegmentProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn creates_a_label() {
//!     let api = Arc::new(ScriptedApi::new());
//!     api.respond("POST", "/labels", 200, json!({"data": {"label": {"key": "env", "value": "prod"}}}));
//!
//!     let tester = ProviderTester::new(SegmentProvider::with_api(api.clone()));
//!     let state = tester
//!         .create("segment_label", json!({"key": "env", "value": "prod"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["value"], "prod");
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{Api, ApiError, ApiRequest, ApiResponse};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::{ImportedResource, ProviderService};

/// An in-process [`Api`] serving scripted responses.
///
/// Responses are queued per `(method, path)`, query strings ignored. Queued
/// responses are served in order; the last one keeps being served once the
/// queue is down to it. Unscripted routes answer `404`.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    routes: Mutex<HashMap<(String, String), VecDeque<(u16, Value)>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedApi {
    /// Create an API with no scripted routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `method` and `path`.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
        let mut routes = lock(&self.routes);
        routes
            .entry((method.to_uppercase(), path.to_string()))
            .or_default()
            .push_back((status, body));
    }

    /// Queue a `404` with a structured not-found error.
    pub fn respond_not_found(&self, method: &str, path: &str) {
        self.respond(
            method,
            path,
            404,
            json!({"errors": [{"type": "not-found", "message": "Resource not found"}]}),
        );
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received for `method` and `path`.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<ApiRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method.as_str().eq_ignore_ascii_case(method) && r.path == path)
            .cloned()
            .collect()
    }

    /// Body of the last request to `method` and `path`.
    pub fn last_body(&self, method: &str, path: &str) -> Option<Value> {
        self.requests_to(method, path)
            .pop()
            .and_then(|request| request.body)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panicking test thread poisons the lock; the data is still usable.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Api for ScriptedApi {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let key = (request.method.as_str().to_string(), request.path.clone());
        lock(&self.requests).push(request);

        let scripted = {
            let mut routes = lock(&self.routes);
            routes.get_mut(&key).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match scripted {
            Some((status, body)) if (200..300).contains(&status) => {
                Ok(ApiResponse::new(status, body))
            }
            Some((status, body)) => Err(ApiError::from_response(status, &body.to_string())),
            None => Err(ApiError::from_response(
                404,
                &json!({"errors": [{"type": "not-found", "message": format!("no scripted response for {} {}", key.0, key.1)}]})
                    .to_string(),
            )),
        }
    }
}

/// A test harness for [`ProviderService`] implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Configure the provider; error diagnostics become a [`TestError`].
    pub async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Create a resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import a resource, expecting exactly one imported state.
    pub async fn import(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError> {
        let mut imported: Vec<ImportedResource> =
            self.provider.import_resource(resource_type, id).await?;
        Ok(imported.pop().map(|r| r.state).unwrap_or(Value::Null))
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Create, then read immediately. Returns `(created, read)`.
    pub async fn create_then_read(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<(Value, Option<Value>), ProviderError> {
        let created = self.create(resource_type, planned_state).await?;
        let read = self.read(resource_type, created.clone()).await?;
        Ok((created, read))
    }

    /// Update, then read immediately. Returns the read state.
    pub async fn update_then_read(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let updated = self.update(resource_type, prior_state, planned_state).await?;
        self.read(resource_type, updated).await
    }

    /// Import, then read to populate the state.
    pub async fn import_then_read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Value>, ProviderError> {
        let seeded = self.import(resource_type, id).await?;
        self.read(resource_type, seeded).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation returned error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed outright.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Pass warnings through; fail on any error diagnostic.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<Vec<Diagnostic>, TestError> {
    if diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error))
    {
        Err(TestError::Diagnostics(diagnostics))
    } else {
        Ok(diagnostics)
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that an error renders a diagnostic whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no diagnostic summary contains the substring.
pub fn assert_error_contains(err: &ProviderError, substring: &str) {
    let diagnostics = err.diagnostics();
    assert!(
        diagnostics.iter().any(|d| d.summary.contains(substring)),
        "Expected a diagnostic containing '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that an error carries `count` error diagnostics.
///
/// # Panics
///
/// Panics on a different count.
pub fn assert_error_count(err: &ProviderError, count: usize) {
    let errors = err.diagnostics().into_iter().filter(Diagnostic::is_error).count();
    assert_eq!(errors, count, "unexpected error count for {:?}", err);
}
