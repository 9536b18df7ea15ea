//! SurrealDB implementation of [`PermissionRepository`].
//!
//! Each (role, resource) pair maps to the record id derived by
//! [`Permission::id_for`], and every write is an `UPSERT` on that id, so a
//! pair can only ever have one row.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shortlink_core::error::{ShortlinkError, ShortlinkResult};
use shortlink_core::matrix::PermissionMatrix;
use shortlink_core::models::permission::{Permission, SetPermission};
use shortlink_core::models::scope::Scopes;
use shortlink_core::repository::PermissionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};
use crate::repository::{BUMP_VERSION, CountRow, IdRow, VersionRow, write_retrying};

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    record_id: String,
    role_id: String,
    resource_id: String,
    scopes: u32,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PermissionRow {
    fn try_into_permission(self) -> Result<Permission, DbError> {
        let scopes = Scopes::try_from_bits(self.scopes).map_err(|e| DbError::InvalidRecord {
            entity: "permission".into(),
            message: e.to_string(),
        })?;
        Ok(Permission {
            id: parse_uuid("permission", &self.record_id)?,
            role_id: parse_uuid("permission", &self.role_id)?,
            resource_id: parse_uuid("permission", &self.resource_id)?,
            scopes,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct ScopesRow {
    scopes: u32,
}

/// One row of a bulk save.
#[derive(Debug, Clone, SurrealValue)]
struct UpsertRow {
    id: String,
    role_id: String,
    resource_id: String,
    scopes: u32,
    description: Option<String>,
}

impl UpsertRow {
    fn of(permission: &Permission) -> Self {
        Self {
            id: permission.id.to_string(),
            role_id: permission.role_id.to_string(),
            resource_id: permission.resource_id.to_string(),
            scopes: permission.scopes.bits(),
            description: permission.description.clone(),
        }
    }
}

const SELECT_PERMISSION: &str =
    "SELECT meta::id(id) AS record_id, * FROM type::record('permission', $id)";

const GUARD_PAIR: &str = "\
IF !record::exists(type::record('role', $role_id)) { THROW 'role not found'; }; \
IF !record::exists(type::record('resource', $resource_id)) { THROW 'resource not found'; };";

const SAVE_MATRIX: &str = "\
BEGIN TRANSACTION; \
FOR $gone IN $removed { DELETE type::record('permission', $gone); }; \
FOR $row IN $rows { \
    IF !record::exists(type::record('role', $row.role_id)) { THROW 'role not found'; }; \
    IF !record::exists(type::record('resource', $row.resource_id)) { \
        THROW 'resource not found'; \
    }; \
    UPSERT type::record('permission', $row.id) SET \
        role_id = $row.role_id, resource_id = $row.resource_id, \
        scopes = $row.scopes, description = $row.description, \
        updated_at = time::now(); \
};";

/// SurrealDB implementation of the Permission repository.
///
/// Clones share one write lock so that read-modify-write operations
/// (`toggle`, `save`) made through the same repository are serialized.
/// Role and resource existence is checked inside each write transaction,
/// so deletes made through the other repositories cannot interleave.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
    writes: Arc<Mutex<()>>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            writes: Arc::new(Mutex::new(())),
        }
    }

    async fn ids(&self, table: &str) -> ShortlinkResult<HashSet<Uuid>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id FROM type::table($table)")
            .bind(("table", table.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        rows.iter()
            .map(|row| parse_uuid(table, &row.record_id))
            .collect::<Result<HashSet<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn require_pair(&self, role_id: Uuid, resource_id: Uuid) -> ShortlinkResult<()> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id FROM type::record('role', $role_id); \
                 SELECT meta::id(id) AS record_id FROM type::record('resource', $resource_id);",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("resource_id", resource_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let roles: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if roles.is_empty() {
            return Err(ShortlinkError::not_found("role", role_id));
        }
        let resources: Vec<IdRow> = result.take(1).map_err(DbError::from)?;
        if resources.is_empty() {
            return Err(ShortlinkError::not_found("resource", resource_id));
        }
        Ok(())
    }

    /// NotFound for the first row whose role or resource is missing.
    async fn require_references(&self, matrix: &PermissionMatrix) -> ShortlinkResult<()> {
        let roles = self.ids("role").await?;
        let resources = self.ids("resource").await?;
        for permission in matrix.iter() {
            if !roles.contains(&permission.role_id) {
                return Err(ShortlinkError::not_found("role", permission.role_id));
            }
            if !resources.contains(&permission.resource_id) {
                return Err(ShortlinkError::not_found("resource", permission.resource_id));
            }
        }
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> ShortlinkResult<Permission> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(SELECT_PERMISSION)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("permission", id_str))?;
        row.try_into_permission().map_err(Into::into)
    }

    async fn upsert(&self, input: SetPermission) -> ShortlinkResult<Permission> {
        let (role_id, resource_id) = (input.role_id, input.resource_id);
        let id = Permission::id_for(role_id, resource_id);

        let mut sets = vec![
            "role_id = $role_id",
            "resource_id = $resource_id",
            "scopes = $scopes",
            "updated_at = time::now()",
        ];
        if input.description.is_some() {
            sets.push("description = $description");
        }
        let query = format!(
            "BEGIN TRANSACTION; \
             {GUARD_PAIR} \
             UPSERT type::record('permission', $id) SET {}; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;",
            sets.join(", ")
        );

        let id_str = id.to_string();
        let scopes = input.scopes.bits();
        let description = input.description;
        let outcome = write_retrying(|| {
            let mut builder = self
                .db
                .query(query.as_str())
                .bind(("id", id_str.clone()))
                .bind(("role_id", role_id.to_string()))
                .bind(("resource_id", resource_id.to_string()))
                .bind(("scopes", scopes));
            if let Some(description) = description.clone() {
                builder = builder.bind(("description", description));
            }
            async move { builder.await?.check() }
        })
        .await;
        if let Err(e) = outcome {
            // A thrown guard means one side of the pair is gone.
            self.require_pair(role_id, resource_id).await?;
            return Err(DbError::from(e).into());
        }

        let permission = self.fetch(id).await?;
        debug!(
            role_id = %permission.role_id,
            resource_id = %permission.resource_id,
            scopes = %permission.scopes,
            "Permission set"
        );
        Ok(permission)
    }

    async fn delete_where(&self, field: &str, value: Uuid) -> ShortlinkResult<u64> {
        let condition = format!("{field} = $value");
        let query = format!(
            "SELECT count() AS total FROM permission WHERE {condition} GROUP ALL; \
             BEGIN TRANSACTION; \
             DELETE permission WHERE {condition}; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;"
        );
        let value_str = value.to_string();
        let mut result = write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("value", value_str.clone()));
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let deleted = counts.first().map(|r| r.total).unwrap_or(0);
        info!(field, %value, deleted, "Permissions deleted");
        Ok(deleted)
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn get(&self, role_id: Uuid, resource_id: Uuid) -> ShortlinkResult<Scopes> {
        let mut result = self
            .db
            .query("SELECT scopes FROM type::record('permission', $id)")
            .bind(("id", Permission::id_for(role_id, resource_id).to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ScopesRow> = result.take(0).map_err(DbError::from)?;
        match rows.first() {
            Some(row) => Scopes::try_from_bits(row.scopes),
            None => Ok(Scopes::empty()),
        }
    }

    async fn set(&self, input: SetPermission) -> ShortlinkResult<Permission> {
        let _guard = self.writes.lock().await;
        self.upsert(input).await
    }

    async fn toggle(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        scope: Scopes,
    ) -> ShortlinkResult<Permission> {
        let _guard = self.writes.lock().await;
        let current = self.get(role_id, resource_id).await?;
        self.upsert(SetPermission {
            role_id,
            resource_id,
            scopes: current.toggle_scope(scope),
            description: None,
        })
        .await
    }

    async fn delete_for_role(&self, role_id: Uuid) -> ShortlinkResult<u64> {
        let _guard = self.writes.lock().await;
        self.delete_where("role_id", role_id).await
    }

    async fn delete_for_resource(&self, resource_id: Uuid) -> ShortlinkResult<u64> {
        let _guard = self.writes.lock().await;
        self.delete_where("resource_id", resource_id).await
    }

    async fn snapshot(&self) -> ShortlinkResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 ORDER BY role_id ASC, resource_id ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let mut permissions = rows
            .into_iter()
            .map(|row| row.try_into_permission())
            .collect::<Result<Vec<_>, DbError>>()?;
        permissions.sort_by_key(Permission::pair);
        Ok(permissions)
    }

    async fn save(&self, entries: Vec<SetPermission>) -> ShortlinkResult<Vec<Permission>> {
        let _guard = self.writes.lock().await;

        // Validate the whole snapshot before touching storage.
        let current = self.snapshot().await?;
        let previous: HashSet<Uuid> = current.iter().map(|p| p.id).collect();
        let mut matrix = PermissionMatrix::from_permissions(current)?;
        matrix.replace_all(entries)?;
        self.require_references(&matrix).await?;

        let rows: Vec<UpsertRow> = matrix.snapshot().iter().map(UpsertRow::of).collect();
        let kept: HashSet<Uuid> = matrix.iter().map(|p| p.id).collect();
        let removed: Vec<String> = previous
            .difference(&kept)
            .map(|id| id.to_string())
            .collect();
        let (written, dropped) = (rows.len(), removed.len());

        let query = format!("{SAVE_MATRIX} {BUMP_VERSION} COMMIT TRANSACTION;");
        let outcome = write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("removed", removed.clone()))
                .bind(("rows", rows.clone()));
            async move { builder.await?.check() }
        })
        .await;
        if let Err(e) = outcome {
            // A role or resource deleted since the check above.
            self.require_references(&matrix).await?;
            return Err(DbError::from(e).into());
        }

        info!(written, dropped, "Permission matrix saved");
        self.snapshot().await
    }

    async fn config_version(&self) -> ShortlinkResult<u64> {
        let mut result = self
            .db
            .query("SELECT version FROM type::record('rbac_version', 'current')")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|row| row.version).unwrap_or(0))
    }
}
