//! Entitlement store liveness check.
//!
//! A gateway that cannot read its entitlements would answer every list with
//! an empty view. The check pings the store periodically and returns once the
//! failures are sustained, which ends the process.

use std::sync::Arc;
use std::time::Duration;

use crate::storage::{EntitlementBackend, run_blocking};
use crate::{Error, Result};

/// Pings `store` every `interval` until `max_failures` consecutive pings fail.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] carrying the last ping error. Never
/// returns `Ok`.
pub async fn run(
    store: Arc<dyn EntitlementBackend>,
    interval: Duration,
    max_failures: u32,
) -> Result<()> {
    let max_failures = max_failures.max(1);
    let mut failures = 0_u32;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match run_blocking(&store, |store| store.ping()).await {
            Ok(()) => {
                if failures > 0 {
                    tracing::info!(failures, "Entitlement store reachable again");
                }
                failures = 0;
            },
            Err(e) => {
                failures += 1;
                metrics::counter!("cfsecurity_liveness_failures_total").increment(1);
                tracing::warn!(failures, max_failures, error = %e, "Entitlement store ping failed");
                if failures >= max_failures {
                    return Err(Error::operation(
                        "liveness",
                        format!("entitlement store unreachable after {failures} attempts: {e}"),
                    ));
                }
            },
        }
    }
}
