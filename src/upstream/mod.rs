//! Platform API facade.
//!
//! [`CloudController`] is the typed view of the platform that the services
//! depend on. [`HttpCloudController`] implements it over HTTP: it injects the
//! service credential, follows pagination, and converts error bodies into
//! [`crate::Error`] so no other module sees `reqwest` types.
//!
//! Filter lists are sent as given. Callers keep them within
//! [`crate::config::MAX_FILTER_GUIDS`] using [`chunk`].

mod chunk;
#[cfg(test)]
pub(crate) mod fake;
mod http;
pub mod info;
mod wire;

pub use chunk::{chunk, dedup};
pub use http::{HttpCloudController, build_http_client, upstream_error};
pub use info::{DiscoveringGrant, PlatformInfo, discover};

use async_trait::async_trait;

use crate::models::{Lifecycle, Organization, Role, SecurityGroup, Space};
use crate::{Error, Result};

/// Spaces together with the organizations they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacesWithOrgs {
    /// Spaces found.
    pub spaces: Vec<Space>,
    /// Organizations owning those spaces.
    pub organizations: Vec<Organization>,
}

/// Typed access to the platform API.
///
/// List operations return the complete result set, following pagination.
/// An empty filter slice means "no filter".
#[async_trait]
pub trait CloudController: Send + Sync {
    /// Lists security groups, filtered by GUID and/or name.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    async fn list_security_groups(
        &self,
        guids: &[String],
        names: &[String],
    ) -> Result<Vec<SecurityGroup>>;

    /// Lists spaces with their organizations included.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    async fn get_spaces_with_orgs(&self, guids: &[String]) -> Result<SpacesWithOrgs>;

    /// Lists organizations by GUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    async fn list_organizations(&self, guids: &[String]) -> Result<Vec<Organization>>;

    /// Lists every role within an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    async fn list_roles_for_org(&self, organization_guid: &str) -> Result<Vec<Role>>;

    /// Lists every role held by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform call fails.
    async fn list_roles_for_user(&self, user_guid: &str) -> Result<Vec<Role>>;

    /// Binds a space to a security group for one lifecycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the binding.
    async fn add_space_to_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()>;

    /// Unbinds a space from a security group for one lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the space is not bound, or another
    /// error if the platform call fails.
    async fn remove_space_from_relationship(
        &self,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()>;

    /// Resolves one space and its organization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the space does not exist.
    async fn get_space(&self, space_guid: &str) -> Result<(Space, Organization)> {
        let guids = [space_guid.to_string()];
        let found = self.get_spaces_with_orgs(&guids).await?;

        let space = found
            .spaces
            .into_iter()
            .find(|space| space.guid == space_guid)
            .ok_or_else(|| Error::NotFound(format!("Space with guid '{space_guid}' not found")))?;

        let organization = found
            .organizations
            .into_iter()
            .find(|org| org.guid == space.organization_guid)
            .unwrap_or_else(|| Organization {
                guid: space.organization_guid.clone(),
                name: String::new(),
            });

        Ok((space, organization))
    }
}
