//! Platform API v3 response shapes.
//!
//! These types stay inside [`crate::upstream`]; the rest of the crate sees
//! the flattened models from [`crate::models`].

use serde::Deserialize;

use crate::models::{Organization, Role, RoleType, Space};

#[derive(Debug, Default, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<Link>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Included {
    #[serde(default)]
    pub organizations: Vec<OrganizationResource>,
}

/// One page of a list response.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub included: Included,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToOne {
    #[serde(default)]
    pub data: Option<GuidRef>,
}

impl ToOne {
    pub fn guid(&self) -> Option<String> {
        self.data.as_ref().map(|d| d.guid.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GuidRef {
    pub guid: String,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationResource {
    pub guid: String,
    pub name: String,
}

impl From<OrganizationResource> for Organization {
    fn from(org: OrganizationResource) -> Self {
        Self {
            guid: org.guid,
            name: org.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SpaceRelationships {
    #[serde(default)]
    pub organization: ToOne,
}

#[derive(Debug, Deserialize)]
pub struct SpaceResource {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub relationships: SpaceRelationships,
}

impl From<SpaceResource> for Space {
    fn from(space: SpaceResource) -> Self {
        Self {
            organization_guid: space.relationships.organization.guid().unwrap_or_default(),
            guid: space.guid,
            name: space.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleRelationships {
    #[serde(default)]
    pub user: ToOne,
    #[serde(default)]
    pub organization: ToOne,
    #[serde(default)]
    pub space: ToOne,
}

#[derive(Debug, Deserialize)]
pub struct RoleResource {
    pub guid: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    #[serde(default)]
    pub relationships: RoleRelationships,
}

impl From<RoleResource> for Role {
    fn from(role: RoleResource) -> Self {
        Self {
            guid: role.guid,
            role_type: role.role_type,
            user_guid: role.relationships.user.guid().unwrap_or_default(),
            organization_guid: role.relationships.organization.guid(),
            space_guid: role.relationships.space.guid(),
        }
    }
}

/// `{"errors": [...]}` body returned on failures.
#[derive(Debug, Deserialize)]
pub struct ErrorsBody {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEntry {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: String,
}

/// Root info document (`GET /`).
#[derive(Debug, Default, Deserialize)]
pub struct InfoDocument {
    #[serde(default)]
    pub links: InfoLinks,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoLinks {
    #[serde(default)]
    pub uaa: Option<Link>,
    #[serde(default)]
    pub login: Option<Link>,
}
