//! Per-entitlement serialization.
//!
//! An entitlement-gated bind checks the row and then calls the platform.
//! Revoking the same pair in between would let the bind through on a stale
//! answer, so both paths take the pair's lock first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type PairKey = (String, String);

/// Async locks keyed by `(security_group_guid, organization_guid)`.
#[derive(Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
}

impl PairLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the lock of one pair.
    pub async fn lock(&self, security_group_guid: &str, organization_guid: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((security_group_guid.to_string(), organization_guid.to_string()))
                    .or_default(),
            )
        };
        lock.lock_owned().await
    }

    /// Number of pairs currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }

    /// Returns `true` when no pair is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
