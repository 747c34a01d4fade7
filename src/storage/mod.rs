//! Storage layer.
//!
//! Holds the local entitlement store. Everything else the gateway serves is
//! owned by the platform and fetched through [`crate::upstream`].

// Dropping the connection guard a statement earlier buys nothing.
#![allow(clippy::significant_drop_tightening)]

pub mod entitlement;
pub mod sqlite;

pub use entitlement::{EntitlementBackend, SqliteEntitlementBackend, run_blocking};
