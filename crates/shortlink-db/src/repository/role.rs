//! SurrealDB implementation of [`RoleRepository`].
//!
//! Structural changes load the whole forest into a [`RoleTree`], apply the
//! mutation there, and write back every row whose placement moved in a
//! single transaction. Reads use the stored nested-set bounds directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shortlink_core::error::{ShortlinkError, ShortlinkResult};
use shortlink_core::hierarchy::RoleTree;
use shortlink_core::models::role::{CreateRole, Role, UpdateRole, validate_name};
use shortlink_core::repository::RoleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};
use crate::repository::{BUMP_VERSION, CountRow, write_retrying};

#[derive(Debug, SurrealValue)]
struct RoleRow {
    record_id: String,
    name: String,
    level: i64,
    parent_id: Option<String>,
    lft: i64,
    rgt: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, DbError> {
        let id = parse_uuid("role", &self.record_id)?;
        let parent_id = self
            .parent_id
            .map(|p| parse_uuid("role", &p))
            .transpose()?;
        let level = i32::try_from(self.level).map_err(|e| DbError::InvalidRecord {
            entity: "role".into(),
            message: format!("level {} out of range: {e}", self.level),
        })?;
        Ok(Role {
            id,
            name: self.name,
            level,
            parent_id,
            lft: self.lft,
            rgt: self.rgt,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// New bounds (and parent) of one stored role.
#[derive(Debug, Clone, SurrealValue)]
struct PlacementRow {
    id: String,
    parent_id: Option<String>,
    lft: i64,
    rgt: i64,
}

impl PlacementRow {
    fn of(role: &Role) -> Self {
        Self {
            id: role.id.to_string(),
            parent_id: role.parent_id.map(|p| p.to_string()),
            lft: role.lft,
            rgt: role.rgt,
        }
    }
}

/// Writes new bounds. A role that changes parent is also touched.
const APPLY_PLACEMENTS: &str = "\
FOR $p IN $placements { \
    UPDATE type::record('role', $p.id) SET updated_at = time::now() \
        WHERE parent_id != $p.parent_id; \
    UPDATE type::record('role', $p.id) SET \
        parent_id = $p.parent_id, lft = $p.lft, rgt = $p.rgt; \
};";

/// Forest loaded for a structural change.
struct LoadedTree {
    tree: RoleTree,
    /// Rows whose stored placement disagreed with the loaded tree.
    stale: Vec<Uuid>,
}

impl LoadedTree {
    /// Placement rows for `changed` plus any stale rows, skipping `except`.
    fn placements(&self, changed: &[Uuid], except: Option<Uuid>) -> Vec<PlacementRow> {
        let ids: BTreeSet<Uuid> = changed.iter().chain(&self.stale).copied().collect();
        ids.into_iter()
            .filter(|id| Some(*id) != except)
            .filter_map(|id| self.tree.get(id))
            .map(PlacementRow::of)
            .collect()
    }
}

/// SurrealDB implementation of the Role repository.
///
/// Clones share one structure lock, so structural changes made through
/// the same repository never interleave.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
    structure: Arc<Mutex<()>>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            structure: Arc::new(Mutex::new(())),
        }
    }

    async fn fetch_all(&self) -> ShortlinkResult<Vec<Role>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role ORDER BY lft ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn load_tree(&self) -> ShortlinkResult<LoadedTree> {
        let stored = self.fetch_all().await?;
        let placements: HashMap<Uuid, (Option<Uuid>, i64, i64)> = stored
            .iter()
            .map(|role| (role.id, (role.parent_id, role.lft, role.rgt)))
            .collect();

        let tree = RoleTree::from_roles(stored)?;
        let stale: Vec<Uuid> = tree
            .list()
            .into_iter()
            .filter(|role| placements.get(&role.id) != Some(&(role.parent_id, role.lft, role.rgt)))
            .map(|role| role.id)
            .collect();
        if !stale.is_empty() {
            warn!(count = stale.len(), "Repairing stored role bounds");
        }
        Ok(LoadedTree { tree, stale })
    }

    async fn query_range(&self, query: &str, role: &Role) -> ShortlinkResult<Vec<Role>> {
        let mut result = self
            .db
            .query(query)
            .bind(("lft", role.lft))
            .bind(("rgt", role.rgt))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> ShortlinkResult<Role> {
        validate_name(&input.name)?;
        let _guard = self.structure.lock().await;

        let mut loaded = self.load_tree().await?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        let changed = loaded.tree.insert(Role {
            id,
            name: input.name.clone(),
            level: input.level,
            parent_id: input.parent_id,
            lft: 0,
            rgt: 0,
            created_at: now,
            updated_at: now,
        })?;
        let placements = loaded.placements(&changed, Some(id));
        let (lft, rgt) = loaded
            .tree
            .get(id)
            .map(|role| (role.lft, role.rgt))
            .ok_or_else(|| ShortlinkError::Internal(format!("inserted role {id} missing")))?;

        let query = format!(
            "BEGIN TRANSACTION; \
             {APPLY_PLACEMENTS} \
             CREATE type::record('role', $id) SET \
             name = $name, level = $level, parent_id = $parent_id, \
             lft = $lft, rgt = $rgt; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;"
        );
        let id_str = id.to_string();
        let parent_str = input.parent_id.map(|p| p.to_string());
        write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("placements", placements.clone()))
                .bind(("id", id_str.clone()))
                .bind(("name", input.name.clone()))
                .bind(("level", i64::from(input.level)))
                .bind(("parent_id", parent_str.clone()))
                .bind(("lft", lft))
                .bind(("rgt", rgt));
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        info!(role_id = %id, parent_id = ?input.parent_id, shifted = changed.len(), "Role created");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> ShortlinkResult<Role> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('role', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", id_str))?;

        row.try_into_role().map_err(Into::into)
    }

    async fn update(&self, id: Uuid, input: UpdateRole) -> ShortlinkResult<Role> {
        if let Some(name) = &input.name {
            validate_name(name)?;
        }
        let _guard = self.structure.lock().await;

        let mut loaded = self.load_tree().await?;
        if !loaded.tree.contains(id) {
            return Err(ShortlinkError::not_found("role", id));
        }
        let changed = match input.parent_id {
            Some(parent_id) => loaded.tree.reparent(id, parent_id)?,
            None => Vec::new(),
        };
        let placements = loaded.placements(&changed, None);

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.level.is_some() {
            sets.push("level = $level");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "BEGIN TRANSACTION; \
             {APPLY_PLACEMENTS} \
             UPDATE type::record('role', $id) SET {}; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;",
            sets.join(", ")
        );

        let id_str = id.to_string();
        write_retrying(|| {
            let mut builder = self
                .db
                .query(query.as_str())
                .bind(("placements", placements.clone()))
                .bind(("id", id_str.clone()));
            if let Some(name) = input.name.clone() {
                builder = builder.bind(("name", name));
            }
            if let Some(level) = input.level {
                builder = builder.bind(("level", i64::from(level)));
            }
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        info!(role_id = %id, moved = changed.len(), "Role updated");
        self.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> ShortlinkResult<()> {
        let _guard = self.structure.lock().await;

        let mut loaded = self.load_tree().await?;
        let (removed, changed) = loaded.tree.remove(id)?;
        let placements = loaded.placements(&changed, Some(id));
        let id_str = id.to_string();

        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM permission WHERE role_id = $id GROUP ALL")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let permissions = counts.first().map(|r| r.total).unwrap_or(0);

        // Children move up to the removed role's parent; its permission
        // rows are removed with it.
        let query = format!(
            "BEGIN TRANSACTION; \
             {APPLY_PLACEMENTS} \
             DELETE permission WHERE role_id = $id; \
             DELETE type::record('role', $id); \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;"
        );
        write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("placements", placements.clone()))
                .bind(("id", id_str.clone()));
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        info!(
            role_id = %id,
            name = %removed.name,
            permissions,
            shifted = changed.len(),
            "Role deleted"
        );
        Ok(())
    }

    async fn list(&self) -> ShortlinkResult<Vec<Role>> {
        self.fetch_all().await
    }

    async fn ancestors_of(&self, id: Uuid) -> ShortlinkResult<Vec<Role>> {
        let role = self.get_by_id(id).await?;
        self.query_range(
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE lft < $lft AND rgt > $rgt \
             ORDER BY lft DESC",
            &role,
        )
        .await
    }

    async fn descendants_of(&self, id: Uuid) -> ShortlinkResult<Vec<Role>> {
        let role = self.get_by_id(id).await?;
        self.query_range(
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE lft > $lft AND rgt < $rgt \
             ORDER BY lft ASC",
            &role,
        )
        .await
    }

    async fn is_descendant(&self, candidate_id: Uuid, ancestor_id: Uuid) -> ShortlinkResult<bool> {
        let candidate = match self.get_by_id(candidate_id).await {
            Ok(role) => role,
            Err(ShortlinkError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        let ancestor = match self.get_by_id(ancestor_id).await {
            Ok(role) => role,
            Err(ShortlinkError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(ancestor.lft < candidate.lft && candidate.rgt < ancestor.rgt)
    }

    async fn rebuild(&self) -> ShortlinkResult<usize> {
        let _guard = self.structure.lock().await;

        let mut loaded = self.load_tree().await?;
        let changed = loaded.tree.rebuild()?;
        let placements = loaded.placements(&changed, None);
        let count = placements.len();
        if count == 0 {
            return Ok(0);
        }

        let query =
            format!("BEGIN TRANSACTION; {APPLY_PLACEMENTS} {BUMP_VERSION} COMMIT TRANSACTION;");
        write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("placements", placements.clone()));
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        info!(count, "Role bounds rebuilt");
        Ok(count)
    }
}
