//! Admin management of entitlements.
//!
//! # Permissions
//!
//! Every operation requires a platform administrator.

use std::sync::Arc;

use crate::models::{CallerIdentity, Entitlement};
use crate::storage::{EntitlementBackend, run_blocking};
use crate::{Error, Result};

use super::PairLocks;

/// Grants, revokes and lists entitlements.
pub struct EntitlementService {
    store: Arc<dyn EntitlementBackend>,
    locks: Arc<PairLocks>,
}

impl EntitlementService {
    /// Creates the service. `locks` must be shared with the binding service.
    #[must_use]
    pub fn new(store: Arc<dyn EntitlementBackend>, locks: Arc<PairLocks>) -> Self {
        Self { store, locks }
    }

    /// Entitles an organization to a security group.
    ///
    /// Returns `true` if the pair is new.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for non-admins, [`Error::InvalidInput`]
    /// for an incomplete pair, or a store error.
    pub async fn entitle(&self, caller: &CallerIdentity, entitlement: &Entitlement) -> Result<bool> {
        require_admin(caller)?;
        entitlement.validate()?;

        let _guard = self
            .locks
            .lock(&entitlement.security_group_guid, &entitlement.organization_guid)
            .await;
        let row = entitlement.clone();
        let created = run_blocking(&self.store, move |store| store.create(&row)).await?;

        if created {
            tracing::info!(
                user_id = %caller.user_id,
                security_group_guid = %entitlement.security_group_guid,
                organization_guid = %entitlement.organization_guid,
                "Entitlement granted"
            );
            metrics::counter!("cfsecurity_entitlement_changes_total", "action" => "grant")
                .increment(1);
        }
        Ok(created)
    }

    /// Revokes an entitlement. Waits for an in-flight bind of the same pair.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for non-admins, [`Error::InvalidInput`]
    /// for an incomplete pair, or a store error.
    pub async fn revoke(&self, caller: &CallerIdentity, entitlement: &Entitlement) -> Result<bool> {
        require_admin(caller)?;
        entitlement.validate()?;

        let _guard = self
            .locks
            .lock(&entitlement.security_group_guid, &entitlement.organization_guid)
            .await;
        let row = entitlement.clone();
        let deleted = run_blocking(&self.store, move |store| store.delete(&row)).await?;

        if deleted {
            tracing::info!(
                user_id = %caller.user_id,
                security_group_guid = %entitlement.security_group_guid,
                organization_guid = %entitlement.organization_guid,
                "Entitlement revoked"
            );
            metrics::counter!("cfsecurity_entitlement_changes_total", "action" => "revoke")
                .increment(1);
        }
        Ok(deleted)
    }

    /// Lists every entitlement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for non-admins or a store error.
    pub async fn list(&self, caller: &CallerIdentity) -> Result<Vec<Entitlement>> {
        require_admin(caller)?;
        run_blocking(&self.store, |store| store.list_all()).await
    }
}

fn require_admin(caller: &CallerIdentity) -> Result<()> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "User {} is not allowed to manage entitlements",
            caller.user_id
        )))
    }
}
