//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use cfsecurity::auth::{GrantedToken, SessionVerifier, TokenGrant, TokenManager};
use cfsecurity::config::{JwtConfig, TuningConfig};
use cfsecurity::models::{
    Lifecycle, Organization, Role, RoleType, SecurityGroup, Space, SpaceRef,
};
use cfsecurity::server::{AppState, Proxy, build_router};
use cfsecurity::storage::{EntitlementBackend, SqliteEntitlementBackend};
use cfsecurity::upstream::{CloudController, SpacesWithOrgs};
use cfsecurity::{Entitlement, Error, Result};

#[derive(Default)]
struct State {
    groups: Vec<SecurityGroup>,
    spaces: Vec<Space>,
    organizations: Vec<Organization>,
    roles: Vec<Role>,
    calls: Vec<String>,
    fail_group_listing: bool,
}

/// In-memory platform that records every call.
#[derive(Default)]
pub struct RecordingPlatform {
    state: Mutex<State>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_org(self, guid: &str, name: &str) -> Self {
        self.state().organizations.push(Organization {
            guid: guid.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_space(self, guid: &str, name: &str, org: &str) -> Self {
        self.state().spaces.push(Space {
            guid: guid.to_string(),
            name: name.to_string(),
            organization_guid: org.to_string(),
        });
        self
    }

    pub fn with_manager(self, user: &str, org: &str) -> Self {
        let guid = format!("role-{}", self.state().roles.len());
        self.state().roles.push(Role {
            guid,
            role_type: RoleType::OrganizationManager,
            user_guid: user.to_string(),
            organization_guid: Some(org.to_string()),
            space_guid: None,
        });
        self
    }

    pub fn with_role(self, user: &str, org: &str, role_type: RoleType) -> Self {
        let guid = format!("role-{}", self.state().roles.len());
        self.state().roles.push(Role {
            guid,
            role_type,
            user_guid: user.to_string(),
            organization_guid: Some(org.to_string()),
            space_guid: None,
        });
        self
    }

    /// Adds a group bound to `running` and `staging` spaces.
    pub fn with_group(self, guid: &str, name: &str, running: &[&str], staging: &[&str]) -> Self {
        let refs = |guids: &[&str]| guids.iter().map(|g| SpaceRef::guid_only(*g)).collect();
        let mut group: SecurityGroup = serde_json::from_value(serde_json::json!({
            "guid": guid,
            "name": name,
            "rules": [{"protocol": "tcp", "destination": "10.0.0.0/8", "ports": "443"}],
            "globally_enabled": {"running": false, "staging": false},
            "links": {"self": {"href": format!("https://api.example.com/v3/security_groups/{guid}")}}
        }))
        .unwrap();
        *group.spaces_mut(Lifecycle::Running) = refs(running);
        *group.spaces_mut(Lifecycle::Staging) = refs(staging);
        self.state().groups.push(group);
        self
    }

    pub fn remove_group(&self, guid: &str) {
        self.state().groups.retain(|g| g.guid != guid);
    }

    pub fn fail_group_listing(&self) {
        self.state().fail_group_listing = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn group(&self, guid: &str) -> Option<SecurityGroup> {
        self.state().groups.iter().find(|g| g.guid == guid).cloned()
    }
}

#[async_trait]
impl CloudController for RecordingPlatform {
    async fn list_security_groups(
        &self,
        guids: &[String],
        names: &[String],
    ) -> Result<Vec<SecurityGroup>> {
        let mut state = self.state();
        state
            .calls
            .push(format!("list_security_groups:{}", guids.join(",")));
        if state.fail_group_listing {
            return Err(Error::Upstream {
                status: 503,
                code: 503,
                title: "Service Unavailable".to_string(),
                detail: "down".to_string(),
            });
        }
        Ok(state
            .groups
            .iter()
            .filter(|g| guids.is_empty() || guids.contains(&g.guid))
            .filter(|g| names.is_empty() || names.contains(&g.name))
            .cloned()
            .collect())
    }

    async fn get_spaces_with_orgs(&self, guids: &[String]) -> Result<SpacesWithOrgs> {
        let mut state = self.state();
        state.calls.push(format!("get_spaces_with_orgs:{}", guids.join(",")));
        let spaces: Vec<Space> = state
            .spaces
            .iter()
            .filter(|s| guids.is_empty() || guids.contains(&s.guid))
            .cloned()
            .collect();
        let organizations = state
            .organizations
            .iter()
            .filter(|o| spaces.iter().any(|s| s.organization_guid == o.guid))
            .cloned()
            .collect();
        Ok(SpacesWithOrgs {
            spaces,
            organizations,
        })
    }

    async fn list_organizations(&self, guids: &[String]) -> Result<Vec<Organization>> {
        let mut state = self.state();
        state.calls.push(format!("list_organizations:{}", guids.join(",")));
        Ok(state
            .organizations
            .iter()
            .filter(|o| guids.is_empty() || guids.contains(&o.guid))
            .cloned()
            .collect())
    }

    async fn list_roles_for_org(&self, organization_guid: &str) -> Result<Vec<Role>> {
        let mut state = self.state();
        state.calls.push(format!("list_roles_for_org:{organization_guid}"));
        Ok(state
            .roles
            .iter()
            .filter(|r| r.organization_guid.as_deref() == Some(organization_guid))
            .cloned()
            .collect())
    }

    async fn list_roles_for_user(&self, user_guid: &str) -> Result<Vec<Role>> {
        let mut state = self.state();
        state.calls.push(format!("list_roles_for_user:{user_guid}"));
        Ok(state
            .roles
            .iter()
            .filter(|r| r.user_guid == user_guid)
            .cloned()
            .collect())
    }

    async fn add_space_to_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!(
            "add_space_to_relationship:{security_group_guid}:{space_guid}:{lifecycle}"
        ));
        let group = state
            .groups
            .iter_mut()
            .find(|g| g.guid == security_group_guid)
            .ok_or_else(|| Error::NotFound(security_group_guid.to_string()))?;
        let list = group.spaces_mut(lifecycle);
        if !list.iter().any(|s| s.guid == space_guid) {
            list.push(SpaceRef::guid_only(space_guid));
        }
        Ok(())
    }

    async fn remove_space_from_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!(
            "remove_space_from_relationship:{security_group_guid}:{space_guid}:{lifecycle}"
        ));
        let group = state
            .groups
            .iter_mut()
            .find(|g| g.guid == security_group_guid)
            .ok_or_else(|| Error::NotFound(security_group_guid.to_string()))?;
        let list = group.spaces_mut(lifecycle);
        let before = list.len();
        list.retain(|s| s.guid != space_guid);
        if list.len() == before {
            return Err(Error::Conflict(format!(
                "Unable to unbind security group from space with guid '{space_guid}'. \
                 Ensure the space is bound to this security group."
            )));
        }
        Ok(())
    }
}

pub const JWT_SECRET: &str = "integration-test-secret-of-at-least-32-bytes";
pub const ADMIN_SCOPE: &str = "cloud_controller.admin";

/// Bearer header for a user token.
pub fn bearer(user_id: &str, scopes: &[&str]) -> String {
    let claims = json!({
        "user_id": user_id,
        "scope": scopes,
        "exp": (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("bearer {token}")
}

pub fn user(user_id: &str) -> String {
    bearer(user_id, &["cloud_controller.read", "cloud_controller.write"])
}

pub fn admin() -> String {
    bearer("admin", &[ADMIN_SCOPE, "cloud_controller.read"])
}

/// Never called while the seeded credential is valid.
struct RefusingGrant;

#[async_trait]
impl TokenGrant for RefusingGrant {
    async fn grant(&self) -> Result<GrantedToken> {
        Err(Error::UpstreamAuth("no identity provider in tests".to_string()))
    }
}

pub fn fresh_tokens() -> Arc<TokenManager> {
    Arc::new(
        TokenManager::new(Arc::new(RefusingGrant), std::time::Duration::from_secs(600))
            .with_credential(
                SecretString::from("service-token".to_string()),
                Utc::now() + chrono::Duration::hours(1),
            ),
    )
}

pub struct Gateway {
    pub router: Router,
    pub platform: Arc<RecordingPlatform>,
    pub store: Arc<SqliteEntitlementBackend>,
}

impl Gateway {
    pub fn new(platform: RecordingPlatform, rows: &[(&str, &str)]) -> Self {
        Self::with_options(platform, rows, &TuningConfig::default(), "http://127.0.0.1:9")
    }

    pub fn with_options(
        platform: RecordingPlatform,
        rows: &[(&str, &str)],
        tuning: &TuningConfig,
        proxy_endpoint: &str,
    ) -> Self {
        let store = Arc::new(SqliteEntitlementBackend::in_memory().unwrap());
        for (g, o) in rows {
            store
                .create(&Entitlement::new(*g, *o))
                .unwrap();
        }
        let platform = Arc::new(platform);

        let jwt = JwtConfig {
            alg: "HS256".to_string(),
            secret: SecretString::from(JWT_SECRET.to_string()),
            issuer: None,
            audience: None,
        };
        let state = AppState::new(
            SessionVerifier::new(&jwt, ADMIN_SCOPE).unwrap(),
            fresh_tokens(),
            store.clone(),
            platform.clone(),
            Proxy::new(reqwest::Client::new(), proxy_endpoint),
            tuning,
        );

        Self {
            router: build_router(state, Some(cfsecurity::observability::detached_handle())),
            platform,
            store,
        }
    }

    /// Sends one request and returns the status and JSON body (`Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }
}
