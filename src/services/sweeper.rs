//! Drift cleanup.
//!
//! Security groups can be deleted on the platform while entitlement rows still
//! point at them. [`ConsistencySweeper`] removes those rows as a side effect of
//! list and get requests. Sweeping is best-effort: it never fails the request
//! that triggered it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::Entitlement;
use crate::storage::{EntitlementBackend, run_blocking};
use crate::upstream::{CloudController, chunk, dedup};

/// Deletes entitlements whose security group no longer exists upstream.
#[derive(Clone)]
pub struct ConsistencySweeper {
    store: Arc<dyn EntitlementBackend>,
    upstream: Arc<dyn CloudController>,
    chunk_size: usize,
}

impl ConsistencySweeper {
    /// Creates a sweeper checking existence `chunk_size` groups at a time.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementBackend>,
        upstream: Arc<dyn CloudController>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            upstream,
            chunk_size,
        }
    }

    /// Looks up every referenced group and deletes the rows of missing ones.
    ///
    /// Returns the number of rows deleted. If any existence lookup fails the
    /// sweep is skipped, since an absent answer proves nothing.
    pub async fn reconcile(&self, entitlements: &[Entitlement]) -> usize {
        let group_guids = dedup(entitlements.iter().map(|e| e.security_group_guid.as_str()));
        if group_guids.is_empty() {
            return 0;
        }

        let mut existing = HashSet::new();
        for guids in chunk(&group_guids, self.chunk_size) {
            match self.upstream.list_security_groups(&guids, &[]).await {
                Ok(groups) => existing.extend(groups.into_iter().map(|g| g.guid)),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping entitlement sweep, existence lookup failed");
                    metrics::counter!("cfsecurity_sweeper_runs_total", "outcome" => "skipped")
                        .increment(1);
                    return 0;
                },
            }
        }

        self.reconcile_against(entitlements, &existing).await
    }

    /// Deletes the rows whose group is not in `existing`.
    ///
    /// `existing` must be the complete answer of an unfiltered-by-name lookup
    /// of every group referenced by `entitlements`.
    pub async fn reconcile_against(
        &self,
        entitlements: &[Entitlement],
        existing: &HashSet<String>,
    ) -> usize {
        let mut deleted = 0;
        for entitlement in entitlements
            .iter()
            .filter(|e| !existing.contains(&e.security_group_guid))
        {
            let row = entitlement.clone();
            match run_blocking(&self.store, move |store| store.delete(&row)).await {
                Ok(true) => {
                    deleted += 1;
                    tracing::warn!(
                        security_group_guid = %entitlement.security_group_guid,
                        organization_guid = %entitlement.organization_guid,
                        "Deleted entitlement of a security group missing upstream"
                    );
                    metrics::counter!("cfsecurity_sweeper_deleted_total").increment(1);
                },
                Ok(false) => {},
                Err(e) => {
                    tracing::error!(
                        security_group_guid = %entitlement.security_group_guid,
                        organization_guid = %entitlement.organization_guid,
                        error = %e,
                        "Failed to delete stale entitlement"
                    );
                },
            }
        }
        metrics::counter!("cfsecurity_sweeper_runs_total", "outcome" => "completed").increment(1);
        deleted
    }
}
