//! `segment_destination_filter`: a filter applied to events on their way to
//! a destination.
//!
//! Each action's optional fields depend on its type:
//!
//! | Type | `path` | `percent` | `fields` |
//! |---|---|---|---|
//! | `DROP` | forbidden | forbidden | forbidden |
//! | `DROP_PROPERTIES` | forbidden | forbidden | required |
//! | `ALLOW_PROPERTIES` | forbidden | forbidden | required |
//! | `SAMPLE` | required | required, in `[0, 1]` | forbidden |
//!
//! The API fills unset action fields with defaults, so state keeps only the
//! fields the plan declared.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::required;
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::resource::{extract, plan_settings, Resource, ResourceError};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::settings::{self, keep_if_declared};

/// Action types accepted by the API.
pub const ACTION_TYPES: [&str; 4] = ["DROP", "DROP_PROPERTIES", "ALLOW_PROPERTIES", "SAMPLE"];

/// Plan and state of a destination filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationFilterState {
    /// Remote identifier.
    pub id: Option<String>,
    /// Destination the filter belongs to.
    pub destination_id: String,
    /// Source whose events are filtered.
    pub source_id: String,
    /// FQL condition selecting events.
    #[serde(rename = "if")]
    pub condition: String,
    /// Display title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Whether the filter is active.
    pub enabled: bool,
    /// Actions applied to matching events.
    pub actions: Vec<FilterAction>,
}

/// One filter action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterAction {
    /// One of [`ACTION_TYPES`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Sampling path, for `SAMPLE`.
    pub path: Option<String>,
    /// Sampling ratio, for `SAMPLE`.
    pub percent: Option<f64>,
    /// Property selection as JSON object text, for the property actions.
    pub fields: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActionWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterWire {
    id: String,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    destination_id: String,
    #[serde(rename = "if", default)]
    condition: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    actions: Vec<ActionWire>,
}

impl FilterAction {
    fn to_wire(&self, index: usize) -> Result<ActionWire, ResourceError> {
        let fields = match &self.fields {
            Some(text) => Some(Value::Object(plan_settings(
                Some(text),
                &format!("actions.{}.fields", index),
            )?)),
            None => None,
        };
        Ok(ActionWire {
            kind: self.kind.clone(),
            path: self.path.clone(),
            percent: self.percent,
            fields,
        })
    }

    /// Map a remote action, keeping only the fields `declared` sets.
    ///
    /// Without a declared counterpart (after an import) every field is kept.
    fn from_wire(wire: ActionWire, declared: Option<&FilterAction>) -> Self {
        let fields_text = |prior: Option<&str>, remote: Option<Value>| {
            remote.and_then(|value| settings::reconcile(prior, &value))
        };
        match declared {
            Some(declared) => Self {
                kind: wire.kind,
                path: keep_if_declared(declared.path.as_ref(), wire.path),
                percent: keep_if_declared(declared.percent.as_ref(), wire.percent),
                fields: keep_if_declared(
                    declared.fields.as_ref(),
                    fields_text(declared.fields.as_deref(), wire.fields),
                ),
            },
            None => Self {
                kind: wire.kind,
                path: wire.path,
                percent: wire.percent,
                fields: fields_text(None, wire.fields),
            },
        }
    }

    fn check(&self, index: usize, diagnostics: &mut Vec<Diagnostic>) {
        let at = |field: &str| format!("actions.{}.{}", index, field);
        let forbid = |field: &str, set: bool, diagnostics: &mut Vec<Diagnostic>| {
            if set {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "'{}' is not allowed for {} actions",
                        field, self.kind
                    ))
                    .with_attribute(at(field)),
                );
            }
        };
        let require = |field: &str, set: bool, diagnostics: &mut Vec<Diagnostic>| {
            if !set {
                diagnostics.push(
                    Diagnostic::error(format!("'{}' is required for {} actions", field, self.kind))
                        .with_attribute(at(field)),
                );
            }
        };

        match self.kind.as_str() {
            "DROP" => {
                forbid("path", self.path.is_some(), diagnostics);
                forbid("percent", self.percent.is_some(), diagnostics);
                forbid("fields", self.fields.is_some(), diagnostics);
            }
            "DROP_PROPERTIES" | "ALLOW_PROPERTIES" => {
                forbid("path", self.path.is_some(), diagnostics);
                forbid("percent", self.percent.is_some(), diagnostics);
                require("fields", self.fields.is_some(), diagnostics);
            }
            "SAMPLE" => {
                require("path", self.path.is_some(), diagnostics);
                require("percent", self.percent.is_some(), diagnostics);
                forbid("fields", self.fields.is_some(), diagnostics);
                if let Some(percent) = self.percent.filter(|p| !(0.0..=1.0).contains(p)) {
                    diagnostics.push(
                        Diagnostic::error("'percent' must be between 0 and 1")
                            .with_detail(format!("got {}", percent))
                            .with_attribute(at("percent")),
                    );
                }
            }
            other => diagnostics.push(
                Diagnostic::error(format!("Unknown filter action type '{}'", other))
                    .with_detail(format!("expected one of {}", ACTION_TYPES.join(", ")))
                    .with_attribute(at("type")),
            ),
        }
    }
}

impl FilterWire {
    fn into_state(self, declared: &[FilterAction]) -> DestinationFilterState {
        let actions = self
            .actions
            .into_iter()
            .enumerate()
            .map(|(i, wire)| FilterAction::from_wire(wire, declared.get(i)))
            .collect();
        DestinationFilterState {
            id: Some(self.id),
            destination_id: self.destination_id,
            source_id: self.source_id,
            condition: self.condition,
            title: self.title,
            description: self.description,
            enabled: self.enabled,
            actions,
        }
    }
}

fn actions_to_wire(actions: &[FilterAction]) -> Result<Vec<ActionWire>, ResourceError> {
    actions
        .iter()
        .enumerate()
        .map(|(i, action)| action.to_wire(i))
        .collect()
}

/// The `segment_destination_filter` resource.
pub struct DestinationFilter {
    api: Arc<dyn Api>,
}

impl DestinationFilter {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }

    fn path(state: &DestinationFilterState) -> Result<String, ResourceError> {
        let destination_id = required(Some(&state.destination_id), "destination_id")?;
        let id = required(state.id.as_deref(), "id")?;
        Ok(format!(
            "/destination/{}/filters/{}",
            segment(destination_id),
            segment(id)
        ))
    }
}

#[async_trait]
impl Resource for DestinationFilter {
    type State = DestinationFilterState;

    const TYPE_NAME: &'static str = "segment_destination_filter";
    const DISPLAY_NAME: &'static str = "destination filter";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Pair("destination_id", "filter_id");

    fn schema() -> Schema {
        let action = AttributeType::object([
            ("type", AttributeType::String),
            ("path", AttributeType::String),
            ("percent", AttributeType::Float64),
            ("fields", AttributeType::Json),
        ]);
        Schema::v0()
            .with_description("A filter on a Segment destination.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("destination_id", Attribute::required_string().with_force_new())
            .with_attribute("source_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "if",
                Attribute::required_string().with_description("FQL condition selecting events."),
            )
            .with_attribute("title", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute(
                "actions",
                Attribute::new(AttributeType::list(action), AttributeFlags::required()),
            )
    }

    fn validate(plan: &DestinationFilterState, diagnostics: &mut Vec<Diagnostic>) {
        for (i, action) in plan.actions.iter().enumerate() {
            action.check(i, diagnostics);
        }
    }

    fn from_import(id: &ImportId) -> DestinationFilterState {
        DestinationFilterState {
            destination_id: id.first().to_string(),
            id: Some(id.second().to_string()),
            ..Default::default()
        }
    }

    async fn create(
        &self,
        plan: &DestinationFilterState,
    ) -> Result<DestinationFilterState, ResourceError> {
        let destination_id = required(Some(&plan.destination_id), "destination_id")?;
        let body = json!({
            "sourceId": plan.source_id,
            "if": plan.condition,
            "title": plan.title,
            "description": plan.description,
            "enabled": plan.enabled,
            "actions": actions_to_wire(&plan.actions)?,
        });
        let path = format!("/destination/{}/filters", segment(destination_id));
        let request = ApiRequest::post(path).with_body(body);
        let response = self.api.send(request).await?;
        let filter: FilterWire = extract(&response, "filter")?;
        Ok(filter.into_state(&plan.actions))
    }

    async fn read(
        &self,
        state: &DestinationFilterState,
    ) -> Result<DestinationFilterState, ResourceError> {
        let response = self.api.send(ApiRequest::get(Self::path(state)?)).await?;
        let filter: FilterWire = extract(&response, "filter")?;
        let mut refreshed = filter.into_state(&state.actions);
        if refreshed.destination_id.is_empty() {
            refreshed.destination_id = state.destination_id.clone();
        }
        Ok(refreshed)
    }

    async fn update(
        &self,
        plan: &DestinationFilterState,
        prior: &DestinationFilterState,
    ) -> Result<DestinationFilterState, ResourceError> {
        let response = self
            .api
            .send(ApiRequest::patch(Self::path(prior)?).with_body(json!({
                "if": plan.condition,
                "title": plan.title,
                "description": plan.description,
                "enabled": plan.enabled,
                "actions": actions_to_wire(&plan.actions)?,
            })))
            .await?;
        let filter: FilterWire = extract(&response, "filter")?;
        let mut updated = filter.into_state(&plan.actions);
        if updated.destination_id.is_empty() {
            updated.destination_id = prior.destination_id.clone();
        }
        Ok(updated)
    }

    async fn delete(&self, state: &DestinationFilterState) -> Result<(), ResourceError> {
        self.api.send(ApiRequest::delete(Self::path(state)?)).await?;
        Ok(())
    }
}
