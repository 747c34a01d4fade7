//! Spaces and organizations as the gateway sees them.

use serde::{Deserialize, Serialize};

/// A compute space, flattened with its owning organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Space GUID.
    pub guid: String,
    /// Space name.
    pub name: String,
    /// GUID of the organization owning the space.
    pub organization_guid: String,
}

/// An organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization GUID.
    pub guid: String,
    /// Organization name.
    pub name: String,
}
