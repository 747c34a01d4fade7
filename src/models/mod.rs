//! Data models.
//!
//! Entitlements are owned by the gateway. Security groups, spaces,
//! organizations and roles are owned by the platform and only read or
//! re-rendered here.

mod entitlement;
mod identity;
mod role;
mod security_group;
mod space;

pub use entitlement::Entitlement;
pub use identity::CallerIdentity;
pub use role::{Role, RoleType};
pub use security_group::{
    GloballyEnabled, Lifecycle, RelationshipData, Rule, SecurityGroup, SecurityGroupRelationships,
    SpaceRef,
};
pub use space::{Organization, Space};
