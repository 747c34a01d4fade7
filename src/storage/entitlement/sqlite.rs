//! `SQLite` backend for entitlement storage.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::models::Entitlement;
use crate::storage::sqlite::{acquire_lock, configure_connection};
use crate::{Error, Result};

use super::traits::EntitlementBackend;

/// SQLite-based entitlement storage backend.
///
/// One table, `security_group_entitlements`, whose primary key is the pair.
/// The table is a record of intent and can be recreated from scratch.
pub struct SqliteEntitlementBackend {
    /// Database connection (mutex for interior mutability).
    conn: Mutex<Connection>,
}

impl SqliteEntitlementBackend {
    /// Opens (or creates) the entitlement database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| Error::OperationFailed {
            operation: "open_entitlement_database".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn)?;

        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Creates an in-memory backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_entitlement_database_memory".to_string(),
            cause: e.to_string(),
        })?;

        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS security_group_entitlements (
                security_group_guid TEXT NOT NULL,
                organization_guid TEXT NOT NULL,
                PRIMARY KEY (security_group_guid, organization_guid)
            );

            CREATE INDEX IF NOT EXISTS idx_entitlements_org
                ON security_group_entitlements(organization_guid);
            ",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "initialize_entitlement_schema".to_string(),
            cause: e.to_string(),
        })
    }

    fn query_entitlements(
        conn: &Connection,
        operation: &str,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Entitlement>> {
        let map_err = |e: rusqlite::Error| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        };

        let mut stmt = conn.prepare(sql).map_err(map_err)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(Entitlement {
                    security_group_guid: row.get(0)?,
                    organization_guid: row.get(1)?,
                })
            })
            .map_err(map_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_err)
    }
}

impl EntitlementBackend for SqliteEntitlementBackend {
    fn create(&self, entitlement: &Entitlement) -> Result<bool> {
        let conn = acquire_lock(&self.conn);

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO security_group_entitlements
                 (security_group_guid, organization_guid) VALUES (?1, ?2)",
                params![entitlement.security_group_guid, entitlement.organization_guid],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "create_entitlement".to_string(),
                cause: e.to_string(),
            })?;

        Ok(inserted > 0)
    }

    fn delete(&self, entitlement: &Entitlement) -> Result<bool> {
        let conn = acquire_lock(&self.conn);

        let deleted = conn
            .execute(
                "DELETE FROM security_group_entitlements
                 WHERE security_group_guid = ?1 AND organization_guid = ?2",
                params![entitlement.security_group_guid, entitlement.organization_guid],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "delete_entitlement".to_string(),
                cause: e.to_string(),
            })?;

        Ok(deleted > 0)
    }

    fn exists(&self, security_group_guid: &str, organization_guid: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);

        let found = conn
            .query_row(
                "SELECT 1 FROM security_group_entitlements
                 WHERE security_group_guid = ?1 AND organization_guid = ?2",
                params![security_group_guid, organization_guid],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| Error::OperationFailed {
                operation: "check_entitlement".to_string(),
                cause: e.to_string(),
            })?;

        Ok(found.is_some())
    }

    fn list_all(&self) -> Result<Vec<Entitlement>> {
        let conn = acquire_lock(&self.conn);
        Self::query_entitlements(
            &conn,
            "list_entitlements",
            "SELECT security_group_guid, organization_guid FROM security_group_entitlements
             ORDER BY security_group_guid, organization_guid",
            params![],
        )
    }

    fn list_for_orgs(&self, organization_guids: &[String]) -> Result<Vec<Entitlement>> {
        if organization_guids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; organization_guids.len()].join(", ");
        let sql = format!(
            "SELECT security_group_guid, organization_guid FROM security_group_entitlements
             WHERE organization_guid IN ({placeholders})
             ORDER BY security_group_guid, organization_guid"
        );

        let conn = acquire_lock(&self.conn);
        Self::query_entitlements(
            &conn,
            "list_entitlements_for_orgs",
            &sql,
            params_from_iter(organization_guids.iter()),
        )
    }

    fn list_for_group(&self, security_group_guid: &str) -> Result<Vec<Entitlement>> {
        let conn = acquire_lock(&self.conn);
        Self::query_entitlements(
            &conn,
            "list_entitlements_for_group",
            "SELECT security_group_guid, organization_guid FROM security_group_entitlements
             WHERE security_group_guid = ?1
             ORDER BY organization_guid",
            params![security_group_guid],
        )
    }

    fn ping(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| Error::OperationFailed {
                operation: "ping_entitlement_database".to_string(),
                cause: e.to_string(),
            })
    }
}
