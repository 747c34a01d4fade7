//! Platform roles.
//!
//! Roles are only read, to decide whether a user manages an organization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The role types the platform reports.
///
/// Only [`RoleType::OrganizationManager`] matters to the gateway; every
/// other value is kept so listings still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Manager of an organization.
    OrganizationManager,
    /// Plain organization member.
    OrganizationUser,
    /// Organization auditor.
    OrganizationAuditor,
    /// Organization billing manager.
    OrganizationBillingManager,
    /// Space developer.
    SpaceDeveloper,
    /// Space manager.
    SpaceManager,
    /// Space auditor.
    SpaceAuditor,
    /// Space supporter.
    SpaceSupporter,
    /// Any role type this build does not know about.
    #[serde(other)]
    Other,
}

impl RoleType {
    /// Returns the wire name of the role type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationManager => "organization_manager",
            Self::OrganizationUser => "organization_user",
            Self::OrganizationAuditor => "organization_auditor",
            Self::OrganizationBillingManager => "organization_billing_manager",
            Self::SpaceDeveloper => "space_developer",
            Self::SpaceManager => "space_manager",
            Self::SpaceAuditor => "space_auditor",
            Self::SpaceSupporter => "space_supporter",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role GUID.
    pub guid: String,
    /// Kind of role.
    pub role_type: RoleType,
    /// User holding the role.
    pub user_guid: String,
    /// Organization the role applies to, for organization roles.
    pub organization_guid: Option<String>,
    /// Space the role applies to, for space roles.
    pub space_guid: Option<String>,
}

impl Role {
    /// Returns `true` if this is an organization manager role held by `user_guid`.
    #[must_use]
    pub fn is_manager_of_org(&self, user_guid: &str, organization_guid: &str) -> bool {
        self.role_type == RoleType::OrganizationManager
            && self.user_guid == user_guid
            && self.organization_guid.as_deref() == Some(organization_guid)
    }
}
