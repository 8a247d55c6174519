//! `segment_user`: a workspace member, managed by email.
//!
//! A user starts life as an invite. Until it is accepted only the invite
//! exists; afterwards only the user does. Every operation therefore looks the
//! email up in the user listing first and the invite listing second, both
//! paginated.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::client::{segment, Api, ApiRequest};
use crate::import::{ImportFormat, ImportId};
use crate::pagination;
use crate::resource::{extract, Resource, ResourceError};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Plan and state of a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    /// Email address; identifies the user.
    pub email: String,
    /// Granted roles.
    pub permissions: Vec<Permission>,
    /// User id, once the invite is accepted.
    pub id: Option<String>,
    /// Display name, once the invite is accepted.
    pub name: Option<String>,
    /// Whether the invite is still outstanding.
    pub invite_pending: Option<bool>,
}

/// A role granted on a set of resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permission {
    /// Role identifier.
    pub role_id: String,
    /// Resources the role applies to; empty for workspace-wide roles.
    pub resources: Vec<PermissionResource>,
}

/// A resource a role is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionResource {
    /// Resource identifier.
    pub id: String,
    /// Resource kind, e.g. `WORKSPACE` or `SOURCE`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionWire {
    role_id: String,
    #[serde(default)]
    resources: Vec<ResourceWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceWire {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct UserSummary {
    id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct UserWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    permissions: Vec<PermissionWire>,
}

impl From<&Permission> for PermissionWire {
    fn from(permission: &Permission) -> Self {
        Self {
            role_id: permission.role_id.clone(),
            resources: permission
                .resources
                .iter()
                .map(|r| ResourceWire {
                    id: r.id.clone(),
                    kind: r.kind.clone(),
                })
                .collect(),
        }
    }
}

impl From<PermissionWire> for Permission {
    fn from(wire: PermissionWire) -> Self {
        Self {
            role_id: wire.role_id,
            resources: wire
                .resources
                .into_iter()
                .map(|r| PermissionResource {
                    id: r.id,
                    kind: r.kind,
                })
                .collect(),
        }
    }
}

fn permissions_to_wire(permissions: &[Permission]) -> Vec<PermissionWire> {
    permissions.iter().map(PermissionWire::from).collect()
}

/// Where an email currently lives remotely.
enum Membership {
    User(UserWire),
    Invite,
    Absent,
}

/// The `segment_user` resource.
pub struct User {
    api: Arc<dyn Api>,
}

impl User {
    /// Bind to an API handle.
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self { api }
    }

    async fn lookup(&self, email: &str) -> Result<Membership, ResourceError> {
        let users: Vec<UserSummary> =
            pagination::list_all(self.api.as_ref(), "/users", "users").await?;
        if let Some(summary) = users.iter().find(|u| u.email.eq_ignore_ascii_case(email)) {
            let response = self
                .api
                .send(ApiRequest::get(format!("/users/{}", segment(&summary.id))))
                .await?;
            return Ok(Membership::User(extract(&response, "user")?));
        }

        let invites: Vec<String> =
            pagination::list_all(self.api.as_ref(), "/invites", "invites").await?;
        if invites.iter().any(|invite| invite.eq_ignore_ascii_case(email)) {
            Ok(Membership::Invite)
        } else {
            Ok(Membership::Absent)
        }
    }

    async fn invite(&self, plan: &UserState) -> Result<UserState, ResourceError> {
        self.api
            .send(ApiRequest::post("/invites").with_body(json!({
                "invites": [{
                    "email": plan.email,
                    "permissions": permissions_to_wire(&plan.permissions),
                }],
            })))
            .await?;
        Ok(UserState {
            id: None,
            name: None,
            invite_pending: Some(true),
            ..plan.clone()
        })
    }

    async fn cancel_invite(&self, email: &str) -> Result<(), ResourceError> {
        self.api
            .send(ApiRequest::delete("/invites").with_query("emails", email))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for User {
    type State = UserState;

    const TYPE_NAME: &'static str = "segment_user";
    const DISPLAY_NAME: &'static str = "user";
    const IMPORT_FORMAT: ImportFormat = ImportFormat::Single("email");

    fn schema() -> Schema {
        let resource = AttributeType::object([
            ("id", AttributeType::String),
            ("type", AttributeType::String),
        ]);
        let permission = AttributeType::object([
            ("role_id", AttributeType::String),
            ("resources", AttributeType::list(resource)),
        ]);
        Schema::v0()
            .with_description("A member of the Segment workspace.")
            .with_attribute("email", Attribute::required_string().with_force_new())
            .with_attribute(
                "permissions",
                Attribute::new(AttributeType::list(permission), AttributeFlags::required()),
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("invite_pending", Attribute::computed_bool())
    }

    fn from_import(id: &ImportId) -> UserState {
        UserState {
            email: id.first().to_string(),
            ..Default::default()
        }
    }

    async fn create(&self, plan: &UserState) -> Result<UserState, ResourceError> {
        self.invite(plan).await
    }

    async fn read(&self, state: &UserState) -> Result<UserState, ResourceError> {
        match self.lookup(&state.email).await? {
            Membership::User(user) => Ok(UserState {
                email: state.email.clone(),
                permissions: user.permissions.into_iter().map(Permission::from).collect(),
                id: Some(user.id),
                name: user.name,
                invite_pending: Some(false),
            }),
            // Invites carry no readable permissions; keep what was sent.
            Membership::Invite => Ok(UserState {
                id: None,
                name: None,
                invite_pending: Some(true),
                ..state.clone()
            }),
            Membership::Absent => Err(ResourceError::Gone(format!("user {}", state.email))),
        }
    }

    async fn update(
        &self,
        plan: &UserState,
        prior: &UserState,
    ) -> Result<UserState, ResourceError> {
        match prior.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                let path = format!("/users/{}/permissions", segment(id));
                self.api
                    .send(ApiRequest::put(path).with_body(json!({
                        "permissions": permissions_to_wire(&plan.permissions),
                    })))
                    .await?;
                Ok(UserState {
                    id: prior.id.clone(),
                    name: prior.name.clone(),
                    invite_pending: Some(false),
                    ..plan.clone()
                })
            }
            None => {
                debug!(email = %plan.email, "Re-issuing invite with new permissions");
                self.cancel_invite(&prior.email).await?;
                self.invite(plan).await
            }
        }
    }

    async fn delete(&self, state: &UserState) -> Result<(), ResourceError> {
        match state.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                self.api
                    .send(ApiRequest::delete("/users").with_query("userIds", id))
                    .await?;
                Ok(())
            }
            None => self.cancel_invite(&state.email).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, ResourceAdapter};
    use crate::testing::ScriptedApi;
    use serde_json::Value;

    fn plan() -> Value {
        json!({
            "email": "ada@example.com",
            "permissions": [{"role_id": "role_admin", "resources": [{"id": "ws_1", "type": "WORKSPACE"}]}],
        })
    }

    fn adapter(api: &Arc<ScriptedApi>) -> ResourceAdapter<User> {
        ResourceAdapter::new(User::new(api.clone()))
    }

    #[tokio::test]
    async fn test_create_sends_invite() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("POST", "/invites", 200, json!({"data": {"emails": ["ada@example.com"]}}));

        let state = adapter(&api).create(plan()).await.unwrap();

        assert_eq!(
            api.last_body("POST", "/invites"),
            Some(json!({"invites": [{"email": "ada@example.com", "permissions": [
                {"roleId": "role_admin", "resources": [{"id": "ws_1", "type": "WORKSPACE"}]}
            ]}]}))
        );
        assert_eq!(state["invite_pending"], true);
        assert!(state["id"].is_null());
    }

    #[tokio::test]
    async fn test_read_finds_accepted_user_across_pages() {
        let api = Arc::new(ScriptedApi::new());
        api.respond(
            "GET",
            "/users",
            200,
            json!({"data": {"users": [{"id": "u_0", "email": "bob@example.com"}], "pagination": {"next": "p2"}}}),
        );
        api.respond(
            "GET",
            "/users",
            200,
            json!({"data": {"users": [{"id": "u_1", "email": "Ada@Example.com"}], "pagination": {}}}),
        );
        api.respond(
            "GET",
            "/users/u_1",
            200,
            json!({"data": {"user": {"id": "u_1", "name": "Ada", "email": "Ada@Example.com", "permissions": [
                {"roleId": "role_admin", "roleName": "Workspace Owner", "resources": [{"id": "ws_1", "type": "WORKSPACE"}]}
            ]}}}),
        );

        let state = adapter(&api)
            .read(json!({"email": "ada@example.com", "invite_pending": true}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["id"], "u_1");
        assert_eq!(state["email"], "ada@example.com");
        assert_eq!(state["invite_pending"], false);
        assert_eq!(state["permissions"][0]["resources"][0]["type"], "WORKSPACE");
        assert!(api.requests_to("GET", "/invites").is_empty());
    }

    #[tokio::test]
    async fn test_read_falls_back_to_invites() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/users", 200, json!({"data": {"users": []}}));
        api.respond(
            "GET",
            "/invites",
            200,
            json!({"data": {"invites": ["other@example.com"], "pagination": {"next": "p2"}}}),
        );
        api.respond("GET", "/invites", 200, json!({"data": {"invites": ["ada@example.com"]}}));

        let state = adapter(&api).read(plan()).await.unwrap().unwrap();

        assert_eq!(state["invite_pending"], true);
        assert_eq!(state["permissions"][0]["role_id"], "role_admin");
    }

    #[tokio::test]
    async fn test_read_absent_everywhere_removes_user() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("GET", "/users", 200, json!({"data": {"users": []}}));
        api.respond("GET", "/invites", 200, json!({"data": {"invites": []}}));

        assert!(adapter(&api).read(plan()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_accepted_user_replaces_permissions() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("PUT", "/users/u_1/permissions", 200, json!({"data": {}}));

        let mut prior = plan();
        prior["id"] = json!("u_1");
        let state = adapter(&api).update(prior, plan()).await.unwrap();

        assert_eq!(state["id"], "u_1");
        let body = api.last_body("PUT", "/users/u_1/permissions").unwrap();
        assert_eq!(body["permissions"][0]["roleId"], "role_admin");
        assert!(api.requests_to("POST", "/invites").is_empty());
    }

    #[tokio::test]
    async fn test_update_pending_invite_reissues_it() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("DELETE", "/invites", 200, json!({"data": {}}));
        api.respond("POST", "/invites", 200, json!({"data": {}}));

        let state = adapter(&api).update(plan(), plan()).await.unwrap();

        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query_param("emails"), Some("ada@example.com"));
        assert_eq!(requests[1].path, "/invites");
        assert_eq!(state["invite_pending"], true);
    }

    #[tokio::test]
    async fn test_delete_targets_user_or_invite() {
        let api = Arc::new(ScriptedApi::new());
        api.respond("DELETE", "/users", 200, json!({"data": {}}));
        api.respond("DELETE", "/invites", 200, json!({"data": {}}));

        let adapter = adapter(&api);
        adapter
            .delete(json!({"email": "ada@example.com", "id": "u_1"}))
            .await
            .unwrap();
        adapter.delete(json!({"email": "ada@example.com"})).await.unwrap();

        let requests = api.requests();
        assert_eq!(requests[0].query_param("userIds"), Some("u_1"));
        assert_eq!(requests[1].query_param("emails"), Some("ada@example.com"));
    }
}
