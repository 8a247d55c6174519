//! Segment resource types.
//!
//! Each module implements [`Resource`] for one engine resource type; the
//! [`ResourceAdapter`] supplies validation, not-found handling and error
//! wrapping. Plan and state use snake_case attribute names; wire types follow
//! the API's camelCase.

use std::sync::Arc;

use serde_json::Value;

use crate::client::{Api, ApiRequest};
use crate::resource::{
    plan_settings, validate_config, DynResource, Resource, ResourceAdapter, ResourceError,
};
use crate::schema::{Diagnostic, Schema};
use crate::settings::{self, Settings};

pub mod destination;
pub mod destination_filter;
pub mod function;
pub mod label;
pub mod source;
pub mod source_schema_settings;
pub mod source_warehouse_connection;
pub mod tracking_plan;
pub mod user;
pub mod warehouse;

pub use destination::Destination;
pub use destination_filter::DestinationFilter;
pub use function::Function;
pub use label::Label;
pub use source::Source;
pub use source_schema_settings::SourceSchemaSettings;
pub use source_warehouse_connection::SourceWarehouseConnection;
pub use tracking_plan::TrackingPlan;
pub use user::User;
pub use warehouse::Warehouse;

/// Static description of a resource type.
#[derive(Clone, Copy)]
pub struct ResourceType {
    /// Engine-facing type name.
    pub name: &'static str,
    /// Schema constructor.
    pub schema: fn() -> Schema,
    /// Local validation of a configuration.
    pub validate: fn(&Value) -> Vec<Diagnostic>,
}

fn describe<R: Resource>() -> ResourceType {
    ResourceType {
        name: R::TYPE_NAME,
        schema: R::schema,
        validate: validate_config::<R>,
    }
}

/// Every resource type.
pub fn types() -> Vec<ResourceType> {
    vec![
        describe::<Source>(),
        describe::<SourceSchemaSettings>(),
        describe::<Destination>(),
        describe::<DestinationFilter>(),
        describe::<Warehouse>(),
        describe::<SourceWarehouseConnection>(),
        describe::<TrackingPlan>(),
        describe::<Function>(),
        describe::<Label>(),
        describe::<User>(),
    ]
}

/// Look up a resource type by name.
pub fn find(name: &str) -> Option<ResourceType> {
    types().into_iter().find(|t| t.name == name)
}

/// Every resource type, bound to one API handle.
pub fn all(api: &Arc<dyn Api>) -> Vec<Box<dyn DynResource>> {
    vec![
        Box::new(ResourceAdapter::new(Source::new(api.clone()))),
        Box::new(ResourceAdapter::new(SourceSchemaSettings::new(api.clone()))),
        Box::new(ResourceAdapter::new(Destination::new(api.clone()))),
        Box::new(ResourceAdapter::new(DestinationFilter::new(api.clone()))),
        Box::new(ResourceAdapter::new(Warehouse::new(api.clone()))),
        Box::new(ResourceAdapter::new(SourceWarehouseConnection::new(api.clone()))),
        Box::new(ResourceAdapter::new(TrackingPlan::new(api.clone()))),
        Box::new(ResourceAdapter::new(Function::new(api.clone()))),
        Box::new(ResourceAdapter::new(Label::new(api.clone()))),
        Box::new(ResourceAdapter::new(User::new(api.clone()))),
    ]
}

/// An identifier the remote call needs, taken from state.
pub(crate) fn required<'a>(
    value: Option<&'a str>,
    attribute: &str,
) -> Result<&'a str, ResourceError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ResourceError::Invalid {
            summary: "Missing identifier".to_string(),
            detail: format!("state has no value for '{}'", attribute),
            attribute: Some(attribute.to_string()),
        })
}

/// Build the settings payload of an update.
///
/// The settings the remote object holds are fetched fresh from `path` and
/// found at the JSON `pointer` of the response, so keys dropped from the plan
/// are sent as `null` even when they were added outside the tool.
pub(crate) async fn settings_update(
    api: &dyn Api,
    path: &str,
    pointer: &str,
    planned: Option<&str>,
) -> Result<Settings, ResourceError> {
    let desired = plan_settings(planned, "settings")?;
    let response = api.send(ApiRequest::get(path)).await?;
    let current = response
        .body
        .pointer(pointer)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(settings::removal_patch(&current, &desired))
}
