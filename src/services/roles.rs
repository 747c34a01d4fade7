//! Organization manager resolution.
//!
//! Roles are fetched on every call; nothing is cached between requests.

use std::sync::Arc;

use crate::models::RoleType;
use crate::upstream::{CloudController, dedup};
use crate::Result;

/// Answers "does this user manage that organization" from platform roles.
#[derive(Clone)]
pub struct RoleResolver {
    upstream: Arc<dyn CloudController>,
}

impl RoleResolver {
    /// Creates a resolver backed by the platform facade.
    #[must_use]
    pub fn new(upstream: Arc<dyn CloudController>) -> Self {
        Self { upstream }
    }

    /// Returns `true` if `user_guid` holds `organization_manager` in the organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the roles cannot be listed.
    pub async fn is_org_manager(&self, user_guid: &str, organization_guid: &str) -> Result<bool> {
        let roles = self.upstream.list_roles_for_org(organization_guid).await?;
        Ok(roles
            .iter()
            .any(|role| role.is_manager_of_org(user_guid, organization_guid)))
    }

    /// Returns the distinct organizations `user_guid` manages.
    ///
    /// # Errors
    ///
    /// Returns an error if the roles cannot be listed.
    pub async fn managed_org_ids(&self, user_guid: &str) -> Result<Vec<String>> {
        let roles = self.upstream.list_roles_for_user(user_guid).await?;
        Ok(dedup(
            roles
                .iter()
                .filter(|role| {
                    role.role_type == RoleType::OrganizationManager && role.user_guid == user_guid
                })
                .filter_map(|role| role.organization_guid.as_deref()),
        ))
    }
}
