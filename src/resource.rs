//! The generic resource reconciliation adapter.
//!
//! A resource type implements [`Resource`]: a typed state, a schema, an import
//! format and the four remote operations. [`ResourceAdapter`] wraps it and
//! provides the uniform lifecycle contract the engine sees through
//! [`DynResource`]:
//!
//! - **Create / Update**: the plan is validated against the schema and the
//!   resource's cross-field rules before any remote call. Validation problems
//!   are accumulated and reported together; a plan that cannot be decoded at
//!   all is rejected immediately.
//! - **Read**: a not-found answer removes the resource from state instead of
//!   failing, so the engine recreates it on the next apply.
//! - **Delete**: not-found counts as success, for every resource type.
//! - **Import**: the identifier is decoded per [`Resource::IMPORT_FORMAT`] and
//!   only seeds the state a subsequent read needs.
//!
//! Remote failures are wrapped with an "Unable to <action> <resource>" summary.
//! Nothing is retried.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{ApiError, ApiResponse};
use crate::error::ProviderError;
use crate::import::{ImportFormat, ImportId};
use crate::schema::{has_errors, Diagnostic, Schema};
use crate::settings::{self, Settings};
use crate::validation;

/// Errors returned by resource and data source implementations.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The object is absent, detected locally (e.g. missing from a listing).
    #[error("{0} no longer exists")]
    Gone(String),

    /// The response did not have the expected shape.
    #[error("{0}")]
    Populate(String),

    /// A plan field could not be converted for the remote call.
    #[error("{summary}: {detail}")]
    Invalid {
        /// Short description of the problem.
        summary: String,
        /// Specifics.
        detail: String,
        /// Attribute path, when known.
        attribute: Option<String>,
    },
}

impl ResourceError {
    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api(err) => err.is_not_found(),
            Self::Gone(_) => true,
            _ => false,
        }
    }

    /// Attach the action context the engine reports.
    pub fn into_provider_error(self, action: Action, display_name: &str) -> ProviderError {
        match self {
            Self::Api(source) => ProviderError::Remote {
                summary: format!("Unable to {} {}", action, display_name),
                source,
            },
            Self::Gone(what) => ProviderError::diagnostic(
                Diagnostic::error(format!("Unable to {} {}", action, display_name))
                    .with_detail(format!("{} no longer exists", what)),
            ),
            Self::Populate(detail) => ProviderError::StatePopulation {
                summary: format!("Unable to populate {} state", display_name),
                detail,
            },
            Self::Invalid {
                summary,
                detail,
                attribute,
            } => {
                let mut diagnostic = Diagnostic::error(summary).with_detail(detail);
                if let Some(attribute) = attribute {
                    diagnostic = diagnostic.with_attribute(attribute);
                }
                ProviderError::diagnostic(diagnostic)
            }
        }
    }
}

/// Lifecycle action, used in diagnostics summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create.
    Create,
    /// Read.
    Read,
    /// Update.
    Update,
    /// Delete.
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// A resource type managed through the remote API.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Typed plan/state. Absent optional and computed attributes are `None`.
    type State: Serialize + DeserializeOwned + Default + Clone + Send + Sync;

    /// Engine-facing type name, e.g. `segment_source`.
    const TYPE_NAME: &'static str;

    /// Name used in diagnostics, e.g. `source`.
    const DISPLAY_NAME: &'static str;

    /// Shape of the import identifier.
    const IMPORT_FORMAT: ImportFormat;

    /// Static schema of the resource.
    fn schema() -> Schema;

    /// Cross-field rules the schema cannot express. Push every violation.
    fn validate(plan: &Self::State, diagnostics: &mut Vec<Diagnostic>) {
        let _ = (plan, diagnostics);
    }

    /// Seed the state a subsequent read needs.
    fn from_import(id: &ImportId) -> Self::State;

    /// Create the remote object and return the resulting state.
    async fn create(&self, plan: &Self::State) -> Result<Self::State, ResourceError>;

    /// Refresh state from the remote object.
    async fn read(&self, state: &Self::State) -> Result<Self::State, ResourceError>;

    /// Bring the remote object in line with the plan.
    async fn update(
        &self,
        plan: &Self::State,
        prior: &Self::State,
    ) -> Result<Self::State, ResourceError>;

    /// Delete the remote object.
    async fn delete(&self, state: &Self::State) -> Result<(), ResourceError>;
}

/// Object-safe lifecycle contract over JSON values, as the engine sees it.
#[async_trait]
pub trait DynResource: Send + Sync {
    /// Engine-facing type name.
    fn type_name(&self) -> &'static str;

    /// Validate a configuration without calling the remote API.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Create and return the new state.
    async fn create(&self, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state; `None` means the remote object is gone.
    async fn read(&self, state: Value) -> Result<Option<Value>, ProviderError>;

    /// Update and return the new state.
    async fn update(&self, prior: Value, planned: Value) -> Result<Value, ProviderError>;

    /// Delete.
    async fn delete(&self, state: Value) -> Result<(), ProviderError>;

    /// Seed state from an import identifier.
    fn import(&self, id: &str) -> Result<Value, ProviderError>;
}

/// Wraps a [`Resource`] with the uniform lifecycle contract.
pub struct ResourceAdapter<R> {
    inner: R,
}

impl<R: Resource> ResourceAdapter<R> {
    /// Wrap a resource implementation.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The wrapped implementation.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn decode_plan(&self, planned: Value) -> Result<R::State, ProviderError> {
        let mut diagnostics = validation::validate(&R::schema(), &planned);
        if has_errors(&diagnostics) {
            return Err(ProviderError::Diagnostics(diagnostics));
        }
        let plan: R::State = decode(planned, "plan")?;
        R::validate(&plan, &mut diagnostics);
        if has_errors(&diagnostics) {
            return Err(ProviderError::Diagnostics(diagnostics));
        }
        Ok(plan)
    }
}

/// Schema and cross-field validation of a configuration, without a remote call.
///
/// Needs no API handle, so it also runs before the provider is configured.
pub fn validate_config<R: Resource>(config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = validation::validate(&R::schema(), config);
    if has_errors(&diagnostics) {
        return diagnostics;
    }
    match serde_json::from_value::<R::State>(config.clone()) {
        Ok(plan) => R::validate(&plan, &mut diagnostics),
        Err(e) => diagnostics
            .push(Diagnostic::error("Unable to decode configuration").with_detail(e.to_string())),
    }
    diagnostics
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| {
        ProviderError::diagnostic(
            Diagnostic::error(format!("Unable to decode {}", what)).with_detail(e.to_string()),
        )
    })
}

fn encode<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

#[async_trait]
impl<R: Resource> DynResource for ResourceAdapter<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate_config::<R>(config)
    }

    async fn create(&self, planned: Value) -> Result<Value, ProviderError> {
        let plan = self.decode_plan(planned)?;
        info!(resource_type = R::TYPE_NAME, "Creating resource");
        let state = self.inner.create(&plan).await.map_err(|e| {
            error!(resource_type = R::TYPE_NAME, error = %e, "Create failed");
            e.into_provider_error(Action::Create, R::DISPLAY_NAME)
        })?;
        info!(resource_type = R::TYPE_NAME, "Create completed");
        encode(&state)
    }

    async fn read(&self, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: R::State = decode(state, "state")?;
        debug!(resource_type = R::TYPE_NAME, "Reading resource");
        match self.inner.read(&prior).await {
            Ok(state) => encode(&state).map(Some),
            Err(e) if e.is_not_found() => {
                warn!(
                    resource_type = R::TYPE_NAME,
                    error = %e,
                    "Resource no longer exists remotely, removing from state"
                );
                Ok(None)
            }
            Err(e) => {
                error!(resource_type = R::TYPE_NAME, error = %e, "Read failed");
                Err(e.into_provider_error(Action::Read, R::DISPLAY_NAME))
            }
        }
    }

    async fn update(&self, prior: Value, planned: Value) -> Result<Value, ProviderError> {
        let plan = self.decode_plan(planned)?;
        let prior: R::State = decode(prior, "prior state")?;
        info!(resource_type = R::TYPE_NAME, "Updating resource");
        let state = self.inner.update(&plan, &prior).await.map_err(|e| {
            error!(resource_type = R::TYPE_NAME, error = %e, "Update failed");
            e.into_provider_error(Action::Update, R::DISPLAY_NAME)
        })?;
        info!(resource_type = R::TYPE_NAME, "Update completed");
        encode(&state)
    }

    async fn delete(&self, state: Value) -> Result<(), ProviderError> {
        let state: R::State = decode(state, "state")?;
        info!(resource_type = R::TYPE_NAME, "Deleting resource");
        match self.inner.delete(&state).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!(resource_type = R::TYPE_NAME, "Resource already deleted");
                Ok(())
            }
            Err(e) => {
                error!(resource_type = R::TYPE_NAME, error = %e, "Delete failed");
                Err(e.into_provider_error(Action::Delete, R::DISPLAY_NAME))
            }
        }
    }

    fn import(&self, id: &str) -> Result<Value, ProviderError> {
        let id = ImportId::parse(id, R::IMPORT_FORMAT)?;
        info!(resource_type = R::TYPE_NAME, id = id.first(), "Importing resource");
        encode(&R::from_import(&id))
    }
}

/// A read-only lookup against the remote API.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Typed configuration.
    type Config: DeserializeOwned + Send + Sync;
    /// Typed result.
    type State: Serialize + Send;

    /// Engine-facing type name.
    const TYPE_NAME: &'static str;

    /// Name used in diagnostics.
    const DISPLAY_NAME: &'static str;

    /// Static schema of the data source.
    fn schema() -> Schema;

    /// Perform the lookup.
    async fn read(&self, config: &Self::Config) -> Result<Self::State, ResourceError>;
}

/// Object-safe data source contract over JSON values.
#[async_trait]
pub trait DynDataSource: Send + Sync {
    /// Engine-facing type name.
    fn type_name(&self) -> &'static str;

    /// Validate a configuration without calling the remote API.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Perform the lookup.
    async fn read(&self, config: Value) -> Result<Value, ProviderError>;
}

/// Wraps a [`DataSource`]. Unlike resources, a missing object is an error here.
pub struct DataSourceAdapter<D> {
    inner: D,
}

impl<D: DataSource> DataSourceAdapter<D> {
    /// Wrap a data source implementation.
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: DataSource> DynDataSource for DataSourceAdapter<D> {
    fn type_name(&self) -> &'static str {
        D::TYPE_NAME
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&D::schema(), config)
    }

    async fn read(&self, config: Value) -> Result<Value, ProviderError> {
        let diagnostics = validation::validate(&D::schema(), &config);
        if has_errors(&diagnostics) {
            return Err(ProviderError::Diagnostics(diagnostics));
        }
        let config: D::Config = decode(config, "configuration")?;
        debug!(data_source_type = D::TYPE_NAME, "Reading data source");
        let state = self.inner.read(&config).await.map_err(|e| {
            error!(data_source_type = D::TYPE_NAME, error = %e, "Data source read failed");
            e.into_provider_error(Action::Read, D::DISPLAY_NAME)
        })?;
        encode(&state)
    }
}

/// Decode `data.<key>` of a response into a wire type.
pub fn extract<T: DeserializeOwned>(response: &ApiResponse, key: &str) -> Result<T, ResourceError> {
    let value = response
        .data(key)
        .ok_or_else(|| ResourceError::Populate(format!("response is missing data.{}", key)))?;
    serde_json::from_value(value.clone()).map_err(|e| {
        ResourceError::Populate(format!("data.{} has an unexpected shape: {}", key, e))
    })
}

/// Decode a plan's settings text for a remote call.
pub fn plan_settings(text: Option<&str>, attribute: &str) -> Result<Settings, ResourceError> {
    settings::decode_optional(text).map_err(|e| ResourceError::Invalid {
        summary: "Invalid settings".to_string(),
        detail: e.to_string(),
        attribute: Some(attribute.to_string()),
    })
}
