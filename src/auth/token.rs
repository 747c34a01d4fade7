//! The gateway's own service credential.
//!
//! Every upstream call is made with a token obtained through a
//! client-credentials grant against the identity provider. [`TokenManager`]
//! keeps the token and its expiry behind one async mutex: a caller that finds
//! the token stale performs the grant while holding the lock, so concurrent
//! callers wait for that single grant instead of starting their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// A freshly granted token.
#[derive(Debug, Clone)]
pub struct GrantedToken {
    /// Bearer token value.
    pub access_token: SecretString,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Something that can grant a service token.
#[async_trait]
pub trait TokenGrant: Send + Sync {
    /// Performs one grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider refuses or cannot be reached.
    async fn grant(&self) -> Result<GrantedToken>;
}

/// Identity provider token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// The cached credential.
struct ServiceCredential {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Holds the service credential and refreshes it before it expires.
pub struct TokenManager {
    grant: Arc<dyn TokenGrant>,
    margin: chrono::Duration,
    state: Mutex<Option<ServiceCredential>>,
}

impl TokenManager {
    /// Creates a manager that refreshes `margin` before expiry.
    #[must_use]
    pub fn new(grant: Arc<dyn TokenGrant>, margin: Duration) -> Self {
        Self {
            grant,
            margin: chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero()),
            state: Mutex::new(None),
        }
    }

    /// Seeds the manager with an existing credential.
    #[must_use]
    pub fn with_credential(self, access_token: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(Some(ServiceCredential {
                access_token,
                expires_at,
            })),
            ..self
        }
    }

    /// Returns a token that is valid for at least the refresh margin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamAuth`] if a needed grant fails. The stale
    /// credential is kept, and the next call tries again.
    pub async fn ensure_fresh_token(&self) -> Result<SecretString> {
        let mut state = self.state.lock().await;

        if let Some(credential) = state.as_ref() {
            if credential.expires_at > Utc::now() {
                return Ok(credential.access_token.clone());
            }
        }

        let granted = match self.grant.grant().await {
            Ok(granted) => granted,
            Err(e) => {
                metrics::counter!("cfsecurity_token_grants_total", "outcome" => "failure")
                    .increment(1);
                tracing::error!(error = %e, "Service token grant failed");
                return Err(match e {
                    Error::UpstreamAuth(_) => e,
                    other => Error::UpstreamAuth(other.to_string()),
                });
            },
        };
        metrics::counter!("cfsecurity_token_grants_total", "outcome" => "success").increment(1);

        let expires_at = Self::expiry(Utc::now(), granted.expires_in, self.margin);
        tracing::debug!(%expires_at, "Service token refreshed");

        let token = granted.access_token.clone();
        *state = Some(ServiceCredential {
            access_token: granted.access_token,
            expires_at,
        });
        Ok(token)
    }

    /// Drops the cached credential so the next call grants again.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    /// Returns when the cached credential stops being used, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.as_ref().map(|c| c.expires_at)
    }

    /// `now + expires_in - margin`, never before `now`.
    fn expiry(now: DateTime<Utc>, expires_in: u64, margin: chrono::Duration) -> DateTime<Utc> {
        let lifetime = i64::try_from(expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::zero());
        let usable = lifetime - margin;
        if usable <= chrono::Duration::zero() {
            now
        } else {
            now + usable
        }
    }
}

/// Client-credentials grant against the identity provider.
pub struct ClientCredentialsGrant {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl ClientCredentialsGrant {
    /// Creates a grant posting to `{uaa_endpoint}/oauth/token`.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        uaa_endpoint: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", uaa_endpoint.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret,
        }
    }
}

#[async_trait]
impl TokenGrant for ClientCredentialsGrant {
    async fn grant(&self) -> Result<GrantedToken> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamAuth(format!(
                "identity provider answered {status}: {body}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("invalid token response: {e}")))?;

        Ok(GrantedToken {
            access_token: SecretString::from(body.access_token),
            expires_in: body.expires_in,
        })
    }
}
