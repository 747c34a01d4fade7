//! Space binding on behalf of organization managers.
//!
//! # Permissions
//!
//! | Operation | Required |
//! |-----------|----------|
//! | Bind | Admin or org manager of the space's org, and an entitlement of that org |
//! | Unbind | Admin or org manager of the space's org |
//! | Check | Any authenticated caller |
//!
//! Unbind deliberately skips the entitlement check so an organization whose
//! entitlement was revoked can still remove its bindings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{CallerIdentity, Lifecycle, RelationshipData, SpaceRef};
use crate::storage::{EntitlementBackend, run_blocking};
use crate::upstream::{CloudController, dedup};
use crate::{Error, Result};

use super::{PairLocks, RoleResolver};

/// Answer of the entitlement check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCheck {
    /// Organization owning the space.
    pub organization_guid: String,
    /// Whether that organization may use the security group.
    pub is_entitled: bool,
}

/// Binds and unbinds spaces after checking the caller's rights.
pub struct BindingService {
    store: Arc<dyn EntitlementBackend>,
    upstream: Arc<dyn CloudController>,
    roles: RoleResolver,
    locks: Arc<PairLocks>,
}

impl BindingService {
    /// Creates the service. `locks` must be shared with the entitlement service.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementBackend>,
        upstream: Arc<dyn CloudController>,
        locks: Arc<PairLocks>,
    ) -> Self {
        Self {
            roles: RoleResolver::new(Arc::clone(&upstream)),
            store,
            upstream,
            locks,
        }
    }

    /// Binds every space of `request` to the group for `lifecycle`.
    ///
    /// All spaces are authorized before the first upstream write, so a
    /// rejected space leaves nothing bound.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if the body names no space
    /// - [`Error::Forbidden`] if the caller may not manage a space's org, or
    ///   that org is not entitled to the group
    /// - any upstream error of the space lookup or the bind itself
    pub async fn bind(
        &self,
        caller: &CallerIdentity,
        security_group_guid: &str,
        request: &RelationshipData,
        lifecycle: Lifecycle,
    ) -> Result<RelationshipData> {
        let space_guids = dedup(request.data.iter().map(|space| space.guid.as_str()));
        if space_guids.is_empty() {
            return Err(Error::InvalidInput(
                "Request body must contain at least one space guid in 'data'".to_string(),
            ));
        }

        let mut targets = Vec::with_capacity(space_guids.len());
        for space_guid in &space_guids {
            let (space, _) = self.upstream.get_space(space_guid).await?;
            self.authorize(caller, &space.organization_guid).await?;
            self.require_entitlement(security_group_guid, &space.organization_guid, space_guid)
                .await?;
            targets.push((space_guid, space.organization_guid));
        }

        for (space_guid, organization_guid) in targets {
            let _guard = self.locks.lock(security_group_guid, &organization_guid).await;
            // revoked while we were authorizing the other spaces
            self.require_entitlement(security_group_guid, &organization_guid, space_guid)
                .await?;

            self.upstream
                .add_space_to_relationship(security_group_guid, space_guid, lifecycle)
                .await?;

            tracing::info!(
                user_id = %caller.user_id,
                security_group_guid,
                space_guid = %space_guid,
                organization_guid = %organization_guid,
                lifecycle = %lifecycle,
                "Bound space to security group"
            );
            metrics::counter!(
                "cfsecurity_bindings_total",
                "action" => "bind",
                "lifecycle" => lifecycle.as_str()
            )
            .increment(1);
        }

        Ok(RelationshipData {
            data: space_guids.into_iter().map(SpaceRef::guid_only).collect(),
        })
    }

    /// Unbinds one space from the group for `lifecycle`.
    ///
    /// # Errors
    ///
    /// - [`Error::Forbidden`] if the caller may not manage the space's org
    /// - [`Error::Conflict`] if the space is not bound
    /// - any other upstream error
    pub async fn unbind(
        &self,
        caller: &CallerIdentity,
        security_group_guid: &str,
        space_guid: &str,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let (space, _) = self.upstream.get_space(space_guid).await?;
        self.authorize(caller, &space.organization_guid).await?;

        self.upstream
            .remove_space_from_relationship(security_group_guid, space_guid, lifecycle)
            .await?;

        tracing::info!(
            user_id = %caller.user_id,
            security_group_guid,
            space_guid,
            organization_guid = %space.organization_guid,
            lifecycle = %lifecycle,
            "Unbound space from security group"
        );
        metrics::counter!(
            "cfsecurity_bindings_total",
            "action" => "unbind",
            "lifecycle" => lifecycle.as_str()
        )
        .increment(1);
        Ok(())
    }

    /// Reports whether the space's organization is entitled to the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the space cannot be resolved or the store fails.
    pub async fn check(&self, security_group_guid: &str, space_guid: &str) -> Result<EntitlementCheck> {
        let (space, _) = self.upstream.get_space(space_guid).await?;
        let is_entitled = self
            .entitled(security_group_guid, &space.organization_guid)
            .await?;
        Ok(EntitlementCheck {
            organization_guid: space.organization_guid,
            is_entitled,
        })
    }

    async fn authorize(&self, caller: &CallerIdentity, organization_guid: &str) -> Result<()> {
        if caller.is_admin
            || self
                .roles
                .is_org_manager(&caller.user_id, organization_guid)
                .await?
        {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "User {} is not an organization manager of org {organization_guid}",
            caller.user_id
        )))
    }

    async fn entitled(&self, security_group_guid: &str, organization_guid: &str) -> Result<bool> {
        let (group, org) = (security_group_guid.to_string(), organization_guid.to_string());
        run_blocking(&self.store, move |store| store.exists(&group, &org)).await
    }

    async fn require_entitlement(
        &self,
        security_group_guid: &str,
        organization_guid: &str,
        space_guid: &str,
    ) -> Result<()> {
        if self.entitled(security_group_guid, organization_guid).await? {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "Org {organization_guid} not entitled with security group {security_group_guid} for space {space_guid}"
        )))
    }
}
