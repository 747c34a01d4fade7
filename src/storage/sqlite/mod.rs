//! Shared `SQLite` infrastructure for storage backends.

mod connection;

pub use connection::{acquire_lock, configure_connection};
