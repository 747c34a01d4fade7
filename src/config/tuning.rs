//! Upstream sizing knobs.

use std::time::Duration;

use crate::{Error, Result};

/// Largest GUID list the platform accepts in one filter.
pub const MAX_FILTER_GUIDS: usize = 50;

/// Largest page the platform returns.
pub const MAX_PER_PAGE: usize = 5000;

/// Chunking, paging and credential refresh settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningConfig {
    /// Security group GUIDs per upstream list call.
    pub security_group_chunk_size: usize,
    /// Space GUIDs per upstream space lookup.
    pub space_chunk_size: usize,
    /// Page size requested on every list call.
    pub per_page: usize,
    /// How long before expiry the service credential is considered stale.
    pub token_refresh_margin: Duration,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            security_group_chunk_size: 20,
            space_chunk_size: MAX_FILTER_GUIDS,
            per_page: MAX_PER_PAGE,
            token_refresh_margin: Duration::from_secs(600),
        }
    }
}

impl TuningConfig {
    /// Checks every value against the platform limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        check_range(
            "tuning.security_group_chunk_size",
            self.security_group_chunk_size,
            MAX_FILTER_GUIDS,
        )?;
        check_range(
            "tuning.space_chunk_size",
            self.space_chunk_size,
            MAX_FILTER_GUIDS,
        )?;
        check_range("tuning.per_page", self.per_page, MAX_PER_PAGE)
    }
}

fn check_range(name: &str, value: usize, max: usize) -> Result<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{name} must be between 1 and {max}, got {value}"
        )))
    }
}
