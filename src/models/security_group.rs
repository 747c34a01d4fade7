//! Security groups and their space relationships.
//!
//! Security groups are owned by the platform. The gateway reads them, rewrites
//! the `running_spaces`/`staging_spaces` relationship lists for non-admin
//! callers and otherwise passes every field through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The lifecycle a space is bound to a security group for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Applies to running application instances.
    Running,
    /// Applies to staging containers.
    Staging,
}

impl Lifecycle {
    /// Returns the lifecycle name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Staging => "staging",
        }
    }

    /// Returns the relationship path segment (`running_spaces` or `staging_spaces`).
    #[must_use]
    pub const fn relationship_segment(&self) -> &'static str {
        match self {
            Self::Running => "running_spaces",
            Self::Staging => "staging_spaces",
        }
    }

    /// Parses a relationship path segment.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// assert_eq!(Lifecycle::from_segment("staging_spaces"), Some(Lifecycle::Staging));
    /// assert_eq!(Lifecycle::from_segment("spaces"), None);
    /// ```
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "running_spaces" => Some(Self::Running),
            "staging_spaces" => Some(Self::Staging),
            _ => None,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reference to a space inside a relationship list.
///
/// Upstream only fills `guid`. The gateway adds the space and organization
/// names. A placeholder for an entitled organization without any bound space
/// carries the organization only, and its empty `guid` is omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRef {
    /// Space GUID, empty for placeholders.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guid: String,

    /// Space name.
    #[serde(rename = "spacename", default, skip_serializing_if = "String::is_empty")]
    pub space_name: String,

    /// GUID of the organization owning the space.
    #[serde(rename = "orgguid", default, skip_serializing_if = "String::is_empty")]
    pub org_guid: String,

    /// Organization name.
    #[serde(rename = "orgname", default, skip_serializing_if = "String::is_empty")]
    pub org_name: String,

    /// Set on entries of the running list.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_running: bool,

    /// Set on entries of the staging list.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_staging: bool,
}

impl SpaceRef {
    /// Builds a bare reference, as sent upstream in bind bodies.
    #[must_use]
    pub fn guid_only(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }

    /// Builds the "entitled but unbound" marker for an organization.
    #[must_use]
    pub fn placeholder(org_guid: &str, org_name: &str, lifecycle: Lifecycle) -> Self {
        Self {
            org_guid: org_guid.to_string(),
            org_name: org_name.to_string(),
            ..Self::default()
        }
        .in_lifecycle(lifecycle)
    }

    /// Marks the reference as belonging to the given lifecycle list.
    #[must_use]
    pub const fn in_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.is_running = matches!(lifecycle, Lifecycle::Running);
        self.is_staging = matches!(lifecycle, Lifecycle::Staging);
        self
    }

    /// Returns `true` for placeholder entries.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.guid.is_empty()
    }
}

/// A `{"data": [...]}` relationship body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipData {
    /// Referenced spaces.
    #[serde(default)]
    pub data: Vec<SpaceRef>,
}

/// The two relationship lists of a security group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRelationships {
    /// Spaces bound for the running lifecycle.
    #[serde(default)]
    pub running_spaces: RelationshipData,
    /// Spaces bound for the staging lifecycle.
    #[serde(default)]
    pub staging_spaces: RelationshipData,
}

/// Whether a group applies to every space of the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GloballyEnabled {
    /// Applies to all running instances.
    #[serde(default)]
    pub running: bool,
    /// Applies to all staging containers.
    #[serde(default)]
    pub staging: bool,
}

/// One network rule. Rule contents are never modified by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// `tcp`, `udp`, `icmp` or `all`.
    pub protocol: String,
    /// CIDR, range or single address.
    pub destination: String,
    /// Port list or range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    /// Any other rule attribute (`type`, `code`, `description`, `log`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A platform security group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    /// Security group GUID.
    pub guid: String,

    /// Unique name.
    pub name: String,

    /// Network rules.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Global enablement flags.
    #[serde(default)]
    pub globally_enabled: GloballyEnabled,

    /// Space bindings.
    #[serde(default)]
    pub relationships: SecurityGroupRelationships,

    /// Fields the gateway does not interpret (`created_at`, `links`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SecurityGroup {
    /// Returns the relationship list for a lifecycle.
    #[must_use]
    pub fn spaces(&self, lifecycle: Lifecycle) -> &[SpaceRef] {
        match lifecycle {
            Lifecycle::Running => &self.relationships.running_spaces.data,
            Lifecycle::Staging => &self.relationships.staging_spaces.data,
        }
    }

    /// Returns a mutable relationship list for a lifecycle.
    pub const fn spaces_mut(&mut self, lifecycle: Lifecycle) -> &mut Vec<SpaceRef> {
        match lifecycle {
            Lifecycle::Running => &mut self.relationships.running_spaces.data,
            Lifecycle::Staging => &mut self.relationships.staging_spaces.data,
        }
    }

    /// Iterates over every non-placeholder space GUID in both lists.
    pub fn bound_space_guids(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .running_spaces
            .data
            .iter()
            .chain(self.relationships.staging_spaces.data.iter())
            .filter(|space| !space.is_placeholder())
            .map(|space| space.guid.as_str())
    }
}
