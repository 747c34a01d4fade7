//! Prometheus metrics.
//!
//! The recorder is installed without its own listener; the gateway renders
//! it on `GET /metrics` of the main router.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::{Error, Result};

/// Upstream latency buckets, in seconds.
const UPSTREAM_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Installs the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            UPSTREAM_BUCKETS,
        )
        .map_err(|e| Error::operation("metrics_recorder_install", e))?
        .install_recorder()
        .map_err(|e| Error::operation("metrics_recorder_install", e))
}

/// Builds a recorder that is not installed globally, for tests.
#[must_use]
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
