//! Permission matrix: one scope bitmask per (role, resource) pair.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ShortlinkError, ShortlinkResult};
use crate::models::permission::{Permission, SetPermission};
use crate::models::scope::Scopes;

/// In-memory permission matrix with upsert semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    rows: HashMap<(Uuid, Uuid), Permission>,
}

impl PermissionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load stored rows; a repeated pair is a `Conflict`.
    pub fn from_permissions(
        permissions: impl IntoIterator<Item = Permission>,
    ) -> ShortlinkResult<Self> {
        let mut matrix = Self::new();
        for permission in permissions {
            let pair = permission.pair();
            if matrix.rows.insert(pair, permission).is_some() {
                return Err(duplicate_pair(pair));
            }
        }
        Ok(matrix)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Scopes held by the pair; empty when there is no row.
    pub fn get(&self, role_id: Uuid, resource_id: Uuid) -> Scopes {
        self.rows
            .get(&(role_id, resource_id))
            .map(|row| row.scopes)
            .unwrap_or_default()
    }

    pub fn row(&self, role_id: Uuid, resource_id: Uuid) -> Option<&Permission> {
        self.rows.get(&(role_id, resource_id))
    }

    /// Upsert the pair's scopes.
    pub fn set(&mut self, input: SetPermission) -> Permission {
        let now = Utc::now();
        let pair = (input.role_id, input.resource_id);
        let row = self.rows.entry(pair).or_insert_with(|| Permission {
            id: Permission::id_for(input.role_id, input.resource_id),
            role_id: input.role_id,
            resource_id: input.resource_id,
            scopes: Scopes::empty(),
            description: None,
            created_at: now,
            updated_at: now,
        });
        row.scopes = input.scopes;
        if input.description.is_some() {
            row.description = input.description;
        }
        row.updated_at = now;
        row.clone()
    }

    /// Flip one operation scope on the pair, creating the row if absent.
    pub fn toggle(&mut self, role_id: Uuid, resource_id: Uuid, scope: Scopes) -> Permission {
        let scopes = self.get(role_id, resource_id).toggle_scope(scope);
        self.set(SetPermission {
            role_id,
            resource_id,
            scopes,
            description: None,
        })
    }

    pub fn delete_for_role(&mut self, role_id: Uuid) -> usize {
        let before = self.rows.len();
        self.rows.retain(|(role, _), _| *role != role_id);
        before - self.rows.len()
    }

    pub fn delete_for_resource(&mut self, resource_id: Uuid) -> usize {
        let before = self.rows.len();
        self.rows.retain(|(_, resource), _| *resource != resource_id);
        before - self.rows.len()
    }

    /// Every row, ordered by (role, resource).
    pub fn snapshot(&self) -> Vec<Permission> {
        let mut rows: Vec<Permission> = self.rows.values().cloned().collect();
        rows.sort_by_key(Permission::pair);
        rows
    }

    /// Replace the whole matrix. The input is validated first; on error
    /// the matrix is left untouched. Rows for pairs that already existed
    /// keep their id and creation time.
    pub fn replace_all(&mut self, entries: Vec<SetPermission>) -> ShortlinkResult<()> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            let pair = (entry.role_id, entry.resource_id);
            if !seen.insert(pair) {
                return Err(duplicate_pair(pair));
            }
        }

        let now = Utc::now();
        let rows = entries
            .into_iter()
            .map(|entry| {
                let pair = (entry.role_id, entry.resource_id);
                let created_at = self.rows.get(&pair).map_or(now, |row| row.created_at);
                let row = Permission {
                    id: Permission::id_for(entry.role_id, entry.resource_id),
                    role_id: entry.role_id,
                    resource_id: entry.resource_id,
                    scopes: entry.scopes,
                    description: entry.description,
                    created_at,
                    updated_at: now,
                };
                (pair, row)
            })
            .collect();
        self.rows = rows;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.rows.values()
    }

    /// Whether both matrices grant the same scopes to every pair. Rows
    /// with empty scopes count as absent; timestamps are ignored.
    pub fn grants_equal(&self, other: &Self) -> bool {
        self.rows
            .keys()
            .chain(other.rows.keys())
            .all(|&(role, resource)| self.get(role, resource) == other.get(role, resource))
    }
}

fn duplicate_pair((role_id, resource_id): (Uuid, Uuid)) -> ShortlinkError {
    ShortlinkError::Conflict {
        message: format!("duplicate permission for role {role_id} on resource {resource_id}"),
    }
}
