//! Entitlement storage backends.
//!
//! The store answers one question: which organization may use which
//! security group. Only `SQLite` is supported.

mod sqlite;
mod traits;

use std::sync::Arc;

pub use sqlite::SqliteEntitlementBackend;
pub use traits::EntitlementBackend;

use crate::{Error, Result};

/// Runs a store call on the blocking thread pool.
///
/// Store calls do disk I/O under a mutex and must not hold an async worker.
///
/// # Errors
///
/// Returns the call's own error, or [`Error::OperationFailed`] if the task
/// panicked or was cancelled.
pub async fn run_blocking<T, F>(store: &Arc<dyn EntitlementBackend>, call: F) -> Result<T>
where
    F: FnOnce(&dyn EntitlementBackend) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| Error::operation("entitlement_store", format!("store task failed: {e}")))?
}
