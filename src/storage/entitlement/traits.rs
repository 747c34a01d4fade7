//! Entitlement storage trait definitions.

use crate::Result;
use crate::models::Entitlement;

/// Trait for entitlement storage backends.
///
/// Rows are keyed by the `(security_group_guid, organization_guid)` pair and
/// carry nothing else. Implementations must be thread-safe (`Send + Sync`).
pub trait EntitlementBackend: Send + Sync {
    /// Stores a pair.
    ///
    /// # Returns
    ///
    /// `true` if the row was created, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn create(&self, entitlement: &Entitlement) -> Result<bool>;

    /// Deletes a pair.
    ///
    /// # Returns
    ///
    /// `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn delete(&self, entitlement: &Entitlement) -> Result<bool>;

    /// Returns whether the pair exists.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn exists(&self, security_group_guid: &str, organization_guid: &str) -> Result<bool>;

    /// Lists every row ordered by security group, then organization.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_all(&self) -> Result<Vec<Entitlement>>;

    /// Lists the rows of the given organizations.
    ///
    /// An empty slice yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_for_orgs(&self, organization_guids: &[String]) -> Result<Vec<Entitlement>>;

    /// Lists the rows of one security group.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn list_for_group(&self, security_group_guid: &str) -> Result<Vec<Entitlement>>;

    /// Checks the store answers.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be accessed.
    fn ping(&self) -> Result<()>;
}
