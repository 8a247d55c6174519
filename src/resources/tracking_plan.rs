//! `segment_tracking_plan`: a tracking plan and, optionally, its rules.
//!
//! Rules are replaced wholesale through a separate endpoint, so a create with
//! rules takes two calls. Rules are only tracked when the plan declares them;
//! an undeclared rule set is left to other tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::required;
use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::pagination;
use crate::resource::{extract, plan_settings, Resource, ResourceError};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::settings;

/// Plan and state of a tracking plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingPlanState {
    /// Remote identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Plan kind, e.g. `LIVE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Description.
    pub description: Option<String>,
    /// Rules, when managed here.
    pub rules: Option<Vec<Rule>>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

/// One tracking plan rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// Rule kind, e.g. `TRACK` or `IDENTIFY`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event name for `TRACK` rules.
    pub key: Option<String>,
    /// JSON Schema as JSON object text.
    pub json_schema: String,
    /// Rule version.
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default)]
    json_schema: Value,
    #[serde(default)]
    version: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackingPlanWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl TrackingPlanWire {
    fn into_state(self, rules: Option<Vec<Rule>>) -> TrackingPlanState {
        TrackingPlanState {
            id: Some(self.id),
            name: self.name,
            kind: self.kind,
            description: self.description,
            rules,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Rule {
    fn to_wire(&self, index: usize) -> Result<RuleWire, ResourceError> {
        let attribute = format!("rules.{}.json_schema", index);
        let schema = plan_settings(Some(&self.json_schema), &attribute)?;
        Ok(RuleWire {
            kind: self.kind.clone(),
            key: self.key.clone(),
            json_schema: Value::Object(schema),
            version: self.version,
        })
    }

    fn from_wire(wire: RuleWire, prior: Option<&Rule>) -> Self {
        let prior_schema = prior.map(|rule| rule.json_schema.as_str());
        Self {
            kind: wire.kind,
            key: wire.key,
            json_schema: settings::reconcile(prior_schema, &wire.json_schema)
                .unwrap_or_else(|| "{}".to_string()),
            version: wire.version,
        }
    }
}

/// The `segment_tracking_plan` resource.
pub struct TrackingPlan {
    api: Arc<dyn Api>,
}

impl TrackingPlan {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }

    async fn replace_rules(&self, id: &str, rules: &[Rule]) -> Result<(), ResourceError> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| rule.to_wire(i))
            .collect::<Result<Vec<_>, _>>()?;
        self.api
            .send(
                ApiRequest::put(format!("/tracking-plans/{}/rules", segment(id)))
                    .with_body(json!({"rules": rules})),
            )
            .await?;
        Ok(())
    }

    async fn list_rules(&self, id: &str, prior: &[Rule]) -> Result<Vec<Rule>, ResourceError> {
        let rules: Vec<RuleWire> = pagination::list_all(
            self.api.as_ref(),
            &format!("/tracking-plans/{}/rules", segment(id)),
            "rules",
        )
        .await?;
        Ok(rules
            .into_iter()
            .enumerate()
            .map(|(i, wire)| Rule::from_wire(wire, prior.get(i)))
            .collect())
    }
}

#[async_trait]
impl Resource for TrackingPlan {
    type State = TrackingPlanState;

    const TYPE_NAME: &'static str = "segment_tracking_plan";
    const DISPLAY_NAME: &'static str = "tracking plan";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("tracking_plan_id");

    fn schema() -> Schema {
        let rule = AttributeType::object([
            ("type", AttributeType::String),
            ("key", AttributeType::String),
            ("json_schema", AttributeType::Json),
            ("version", AttributeType::Int64),
        ]);
        Schema::v0()
            .with_description("A Segment tracking plan.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_description("Plan kind, e.g. LIVE.")
                    .with_force_new(),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "rules",
                Attribute::new(AttributeType::list(rule), AttributeFlags::optional())
                    .with_description("Rules of the plan; omit to leave them unmanaged."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
    }

    fn from_import(id: &ImportId) -> TrackingPlanState {
        // Seed an empty rule set so an imported plan tracks its rules.
        TrackingPlanState {
            id: Some(id.first().to_string()),
            rules: Some(Vec::new()),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &TrackingPlanState) -> Result<TrackingPlanState, ResourceError> {
        let response = self
            .api
            .send(ApiRequest::post("/tracking-plans").with_body(json!({
                "name": plan.name,
                "type": plan.kind,
                "description": plan.description,
            })))
            .await?;
        let created: TrackingPlanWire = extract(&response, "trackingPlan")?;
        if let Some(rules) = &plan.rules {
            self.replace_rules(&created.id, rules).await?;
        }
        Ok(created.into_state(plan.rules.clone()))
    }

    async fn read(&self, state: &TrackingPlanState) -> Result<TrackingPlanState, ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        let response = self
            .api
            .send(ApiRequest::get(format!("/tracking-plans/{}", segment(id))))
            .await?;
        let plan: TrackingPlanWire = extract(&response, "trackingPlan")?;
        let rules = match &state.rules {
            Some(prior) => Some(self.list_rules(id, prior).await?),
            None => None,
        };
        Ok(plan.into_state(rules))
    }

    async fn update(
        &self,
        plan: &TrackingPlanState,
        prior: &TrackingPlanState,
    ) -> Result<TrackingPlanState, ResourceError> {
        let id = required(prior.id.as_deref(), "id")?;
        let response = self
            .api
            .send(
                ApiRequest::patch(format!("/tracking-plans/{}", segment(id))).with_body(json!({
                    "name": plan.name,
                    "description": plan.description,
                })),
            )
            .await?;
        let updated: TrackingPlanWire = extract(&response, "trackingPlan")?;
        if let Some(rules) = &plan.rules {
            self.replace_rules(id, rules).await?;
        }
        Ok(updated.into_state(plan.rules.clone()))
    }

    async fn delete(&self, state: &TrackingPlanState) -> Result<(), ResourceError> {
        let id = required(state.id.as_deref(), "id")?;
        self.api
            .send(ApiRequest::delete(format!("/tracking-plans/{}", segment(id))))
            .await?;
        Ok(())
    }
}
