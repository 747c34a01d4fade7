//! Entitlement records.
//!
//! An entitlement grants one organization the right to see and bind one
//! security group. The pair is its own key: there is no surrogate id.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A `(security_group_guid, organization_guid)` grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entitlement {
    /// The entitled security group.
    pub security_group_guid: String,

    /// The organization allowed to use the group.
    pub organization_guid: String,
}

impl Entitlement {
    /// Creates a new entitlement for the given pair.
    #[must_use]
    pub fn new(security_group_guid: impl Into<String>, organization_guid: impl Into<String>) -> Self {
        Self {
            security_group_guid: security_group_guid.into(),
            organization_guid: organization_guid.into(),
        }
    }

    /// Rejects pairs with an empty component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the missing field.
    pub fn validate(&self) -> Result<()> {
        if self.security_group_guid.trim().is_empty() {
            return Err(Error::InvalidInput(
                "security_group_guid must not be empty".to_string(),
            ));
        }
        if self.organization_guid.trim().is_empty() {
            return Err(Error::InvalidInput(
                "organization_guid must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
