//! Business logic services.
//!
//! Services combine the entitlement store with the platform facade. They take
//! a [`crate::models::CallerIdentity`] or a user GUID and never see HTTP.

mod binding;
mod entitlements;
mod locks;
mod reassembly;
mod roles;
mod sweeper;

pub use binding::{BindingService, EntitlementCheck};
pub use entitlements::EntitlementService;
pub use locks::PairLocks;
pub use reassembly::{
    DEFAULT_PER_PAGE, ListPagination, ListQuery, PageLink, SecurityGroupList, ViewReassembler,
};
pub use roles::RoleResolver;
pub use sweeper::ConsistencySweeper;
