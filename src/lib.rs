//! # cfsecurity
//!
//! Entitlement-aware authorization gateway for Cloud Foundry security groups.
//!
//! The platform only distinguishes platform administrators from everyone else
//! when it comes to security groups. This gateway sits in front of the Cloud
//! Controller v3 API and lets organization managers list, inspect, bind and
//! unbind the security groups their organization has been entitled to use.
//!
//! ## Features
//!
//! - JWT session verification (HMAC, RSA, EC and `EdDSA` key families)
//! - Local `SQLite` entitlement store keyed by `(security_group_guid, organization_guid)`
//! - Per-caller reassembly of security group views with space and org names
//! - Drift sweeping of entitlements whose security group vanished upstream
//! - Admin pass-through to the platform API for every other route
//!
//! ## Example
//!
//! ```rust,ignore
//! use cfsecurity::config::GatewayConfig;
//! use cfsecurity::server::{AppState, build_router};
//!
//! let config = GatewayConfig::load_from_file(path)?;
//! let state = AppState::new(verifier, tokens, store, upstream, proxy, &config.tuning);
//! let app = build_router(state, None);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod auth;
pub mod config;
pub mod models;
pub mod observability;
pub mod server;
pub mod services;
pub mod storage;
pub mod upstream;

// Re-exports for convenience
pub use config::GatewayConfig;
pub use models::{CallerIdentity, Entitlement, Lifecycle, SecurityGroup};
pub use storage::{EntitlementBackend, SqliteEntitlementBackend};
pub use upstream::CloudController;

/// Error type for gateway operations.
///
/// Every variant maps onto one HTTP status in [`server::response`].
///
/// | Variant | Status | Raised When |
/// |---------|--------|-------------|
/// | `MalformedToken` | 400 | Missing `Authorization` header, token not three segments |
/// | `Unauthorized` | 401 | Bad signature, unsupported algorithm, missing `scope` claim |
/// | `Forbidden` | 403 | Caller is not org manager, org is not entitled, non-admin on admin route |
/// | `NotFound` | 404 | Resource absent, or hidden from an unentitled caller |
/// | `InvalidInput` | 400 | Malformed request body, unknown query filter |
/// | `Upstream` | upstream | Platform API returned an error |
/// | `UpstreamAuth` | 502 | Service credential could not be refreshed |
/// | `Conflict` | 422 | Unbind of a space that is not bound |
/// | `OperationFailed` | 500 | Store failures, I/O, serialization |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The bearer token is missing or not shaped like a JWT.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Authentication failed.
    ///
    /// Raised when:
    /// - JWT signature verification fails
    /// - The token algorithm does not match the configured algorithm
    /// - The token is expired
    /// - The `scope` claim is missing
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist or is hidden from the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A bind request body has no `data` entries
    /// - A query filter other than `names`, `guids`, `page`, `per_page` is used
    /// - An entitlement request misses one of its guids
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The platform API answered with an error.
    #[error("upstream error ({status}|{title}): {detail}")]
    Upstream {
        /// HTTP status returned by the platform.
        status: u16,
        /// Platform error code.
        code: i64,
        /// Platform error title (for example `CF-ResourceNotFound`).
        title: String,
        /// Human readable detail.
        detail: String,
    },

    /// The gateway's own service credential could not be obtained.
    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// The requested relationship change conflicts with upstream state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations fail
    /// - The platform API is unreachable
    /// - A response body cannot be decoded
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
