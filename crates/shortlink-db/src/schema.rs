//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings and used as record ids. Scope masks are
//! stored as integers restricted to the defined bits. The
//! `(role_id, resource_id)` index is the storage-side guarantee that a
//! pair never maps to two permission rows.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "rbac_version",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Resources: protected capability domains, addressed by a unique key
-- =======================================================================
DEFINE TABLE resource SCHEMAFULL;
DEFINE FIELD key ON TABLE resource TYPE string \
    ASSERT string::len($value) > 0;
DEFINE FIELD description ON TABLE resource TYPE option<string>;
DEFINE FIELD created_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_resource_key ON TABLE resource COLUMNS key UNIQUE;

-- =======================================================================
-- Roles: forest with nested-set bounds
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD level ON TABLE role TYPE int DEFAULT 0;
DEFINE FIELD parent_id ON TABLE role TYPE option<string>;
DEFINE FIELD lft ON TABLE role TYPE int;
DEFINE FIELD rgt ON TABLE role TYPE int;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_lft ON TABLE role COLUMNS lft;
DEFINE INDEX idx_role_parent ON TABLE role COLUMNS parent_id;

-- =======================================================================
-- Permissions: one scope bitmask per (role, resource) pair
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD role_id ON TABLE permission TYPE string;
DEFINE FIELD resource_id ON TABLE permission TYPE string;
DEFINE FIELD scopes ON TABLE permission TYPE int \
    ASSERT $value >= 0 AND $value <= 15;
DEFINE FIELD description ON TABLE permission TYPE option<string>;
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_pair ON TABLE permission \
    COLUMNS role_id, resource_id UNIQUE;
DEFINE INDEX idx_permission_resource ON TABLE permission \
    COLUMNS resource_id;
";

// -----------------------------------------------------------------------
// Schema v2: RBAC config version
// -----------------------------------------------------------------------

/// Single-row counter bumped by every resource, role and permission write.
const SCHEMA_V2: &str = "\
DEFINE TABLE rbac_version SCHEMAFULL;
DEFINE FIELD version ON TABLE rbac_version TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
CREATE type::record('rbac_version', 'current') SET version = 0;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
