//! `reqwest` implementation of [`CloudController`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::auth::TokenManager;
use crate::config::CloudFoundryConfig;
use crate::models::{Lifecycle, Organization, Role, SecurityGroup, Space, SpaceRef};
use crate::{Error, Result};

use super::wire::{ErrorsBody, OrganizationResource, Page, RoleResource, SpaceResource};
use super::{CloudController, SpacesWithOrgs};

/// Builds the outbound HTTP client shared by the facade and the token grant.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if a trusted CA certificate is not PEM.
pub fn build_http_client(config: &CloudFoundryConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(format!("cfsecurity/{}", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout)
        .danger_accept_invalid_certs(config.skip_ssl_validation);

    for pem in &config.trusted_ca_certificates {
        let cert = reqwest::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid trusted CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| Error::operation("build_http_client", e))
}

/// Converts a failed platform response into an [`Error::Upstream`].
///
/// The first entry of a `{"errors": [...]}` body is kept verbatim. Other
/// bodies are wrapped with the HTTP status as code and reason as title.
#[must_use]
pub fn upstream_error(status: StatusCode, body: &str) -> Error {
    let first = serde_json::from_str::<ErrorsBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next());

    match first {
        Some(entry) => Error::Upstream {
            status: status.as_u16(),
            code: entry.code,
            title: entry.title,
            detail: entry.detail,
        },
        None => {
            let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
            Error::Upstream {
                status: status.as_u16(),
                code: i64::from(status.as_u16()),
                detail: if body.trim().is_empty() {
                    reason.clone()
                } else {
                    body.trim().to_string()
                },
                title: reason,
            }
        },
    }
}

/// Platform API client.
pub struct HttpCloudController {
    http: reqwest::Client,
    base: String,
    tokens: Arc<TokenManager>,
    per_page: usize,
    read_retries: u32,
    retry_backoff: Duration,
}

impl HttpCloudController {
    /// Creates a client for `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: &str, tokens: Arc<TokenManager>) -> Self {
        Self {
            http,
            base: endpoint.trim_end_matches('/').to_string(),
            tokens,
            per_page: crate::config::MAX_PER_PAGE,
            read_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }

    /// Sets the page size of list calls.
    #[must_use]
    pub const fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    /// Enables bounded retries of read calls.
    #[must_use]
    pub const fn with_read_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.read_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Sends one request with the service token and records metrics.
    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let token = self.tokens.ensure_fresh_token().await?;
        let start = Instant::now();

        let result = request.bearer_auth(token.expose_secret()).send().await;

        metrics::histogram!(
            "cfsecurity_upstream_request_duration_seconds",
            "operation" => operation
        )
        .record(start.elapsed().as_secs_f64());

        let status = result
            .as_ref()
            .map_or_else(|_| "error".to_string(), |r| r.status().as_u16().to_string());
        metrics::counter!(
            "cfsecurity_upstream_requests_total",
            "operation" => operation,
            "status" => status
        )
        .increment(1);

        let response = result.map_err(|e| Error::operation(operation, e))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // revoked before its expiry; grant a new one on the next call
            self.tokens.invalidate().await;
        }
        Ok(response)
    }

    /// GETs and decodes a JSON document, retrying transport errors and 5xx.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.http.get(self.url(path)).query(query);
            let outcome = match self.send(operation, request).await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| Error::operation(operation, e));
                },
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let err = upstream_error(status, &body);
                    if !status.is_server_error() {
                        return Err(err);
                    }
                    err
                },
                Err(err @ Error::UpstreamAuth(_)) => return Err(err),
                Err(err) => err,
            };

            if attempt > self.read_retries {
                return Err(outcome);
            }
            tracing::warn!(operation, attempt, error = %outcome, "Retrying upstream read");
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }

    /// Follows pagination until exhausted.
    async fn list_all<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        filters: &[(&str, String)],
    ) -> Result<(Vec<T>, Vec<OrganizationResource>)> {
        let mut resources = Vec::new();
        let mut organizations = Vec::new();
        let mut page_number = 1_usize;

        loop {
            let mut query: Vec<(&str, String)> = filters.to_vec();
            query.push(("per_page", self.per_page.to_string()));
            if page_number > 1 {
                query.push(("page", page_number.to_string()));
            }

            let page: Page<T> = self.get_json(operation, path, &query).await?;
            resources.extend(page.resources);
            organizations.extend(page.included.organizations);

            if page.pagination.next.is_none() {
                break;
            }
            page_number += 1;
        }

        Ok((resources, organizations))
    }

    /// Sends a relationship change. Never retried.
    async fn send_write(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = self.send(operation, request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(upstream_error(status, &body))
    }
}

fn join(values: &[String]) -> String {
    values.join(",")
}

#[async_trait]
impl CloudController for HttpCloudController {
    async fn list_security_groups(
        &self,
        guids: &[String],
        names: &[String],
    ) -> Result<Vec<SecurityGroup>> {
        let mut filters = Vec::new();
        if !guids.is_empty() {
            filters.push(("guids", join(guids)));
        }
        if !names.is_empty() {
            filters.push(("names", join(names)));
        }
        let (groups, _) = self
            .list_all("list_security_groups", "/v3/security_groups", &filters)
            .await?;
        Ok(groups)
    }

    async fn get_spaces_with_orgs(&self, guids: &[String]) -> Result<SpacesWithOrgs> {
        let mut filters = vec![("include", "organization".to_string())];
        if !guids.is_empty() {
            filters.push(("guids", join(guids)));
        }
        let (spaces, organizations) = self
            .list_all::<SpaceResource>("list_spaces", "/v3/spaces", &filters)
            .await?;

        Ok(SpacesWithOrgs {
            spaces: spaces.into_iter().map(Space::from).collect(),
            organizations: organizations.into_iter().map(Organization::from).collect(),
        })
    }

    async fn list_organizations(&self, guids: &[String]) -> Result<Vec<Organization>> {
        let mut filters = Vec::new();
        if !guids.is_empty() {
            filters.push(("guids", join(guids)));
        }
        let (organizations, _) = self
            .list_all::<OrganizationResource>("list_organizations", "/v3/organizations", &filters)
            .await?;
        Ok(organizations.into_iter().map(Organization::from).collect())
    }

    async fn list_roles_for_org(&self, organization_guid: &str) -> Result<Vec<Role>> {
        let filters = [("organization_guids", organization_guid.to_string())];
        let (roles, _) = self
            .list_all::<RoleResource>("list_roles_for_org", "/v3/roles", &filters)
            .await?;
        Ok(roles.into_iter().map(Role::from).collect())
    }

    async fn list_roles_for_user(&self, user_guid: &str) -> Result<Vec<Role>> {
        let filters = [("user_guids", user_guid.to_string())];
        let (roles, _) = self
            .list_all::<RoleResource>("list_roles_for_user", "/v3/roles", &filters)
            .await?;
        Ok(roles.into_iter().map(Role::from).collect())
    }

    async fn add_space_to_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let path = format!(
            "/v3/security_groups/{security_group_guid}/relationships/{}",
            lifecycle.relationship_segment()
        );
        let body = json!({ "data": [SpaceRef::guid_only(space_guid)] });
        self.send_write("bind_space", Method::POST, &path, Some(body))
            .await
    }

    async fn remove_space_from_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let path = format!(
            "/v3/security_groups/{security_group_guid}/relationships/{}/{space_guid}",
            lifecycle.relationship_segment()
        );
        match self
            .send_write("unbind_space", Method::DELETE, &path, None)
            .await
        {
            Err(Error::Upstream { status: 422, .. }) => Err(Error::Conflict(format!(
                "Unable to unbind security group from space with guid '{space_guid}'. \
                 Ensure the space is bound to this security group."
            ))),
            other => other,
        }
    }
}
