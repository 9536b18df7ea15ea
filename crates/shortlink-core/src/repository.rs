//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must uphold the
//! invariants of the in-memory types: resource keys are unique, the role
//! forest keeps valid nested-set bounds, and there is at most one
//! permission row per (role, resource) pair.

use uuid::Uuid;

use crate::error::ShortlinkResult;
use crate::models::{
    permission::{Permission, SetPermission},
    resource::{CreateResource, Resource, ResourceFilter, UpdateResource},
    role::{CreateRole, Role, UpdateRole},
    scope::Scopes,
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Pagination {
    /// Convert a 1-based page number into an offset window.
    pub fn from_page(page: u64, page_size: u64) -> Self {
        let limit = page_size.max(1);
        Self {
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Resource registry
// ---------------------------------------------------------------------------

pub trait ResourceRepository: Send + Sync {
    /// Fails with `DuplicateKey` if the key is taken.
    fn create(&self, input: CreateResource)
    -> impl Future<Output = ShortlinkResult<Resource>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ShortlinkResult<Resource>> + Send;
    /// Exact, case-sensitive lookup.
    fn find_by_key(&self, key: &str) -> impl Future<Output = ShortlinkResult<Resource>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateResource,
    ) -> impl Future<Output = ShortlinkResult<Resource>> + Send;
    /// Deletes the resource and every permission row referencing it.
    fn delete(&self, id: Uuid) -> impl Future<Output = ShortlinkResult<()>> + Send;
    fn list(
        &self,
        filter: ResourceFilter,
        pagination: Pagination,
    ) -> impl Future<Output = ShortlinkResult<PaginatedResult<Resource>>> + Send;
    /// Every resource, ordered by key.
    fn list_all(&self) -> impl Future<Output = ShortlinkResult<Vec<Resource>>> + Send;
}

// ---------------------------------------------------------------------------
// Role hierarchy
// ---------------------------------------------------------------------------

pub trait RoleRepository: Send + Sync {
    /// Inserts the role as the last child of its parent (or as a new root).
    fn create(&self, input: CreateRole) -> impl Future<Output = ShortlinkResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ShortlinkResult<Role>> + Send;
    /// A changed `parent_id` moves the whole subtree.
    fn update(
        &self,
        id: Uuid,
        input: UpdateRole,
    ) -> impl Future<Output = ShortlinkResult<Role>> + Send;
    /// Removes the role and its permission rows; children move up to the
    /// removed role's parent.
    fn delete(&self, id: Uuid) -> impl Future<Output = ShortlinkResult<()>> + Send;
    /// Every role, ordered by `lft`.
    fn list(&self) -> impl Future<Output = ShortlinkResult<Vec<Role>>> + Send;
    /// Strict ancestors, nearest first.
    fn ancestors_of(&self, id: Uuid) -> impl Future<Output = ShortlinkResult<Vec<Role>>> + Send;
    /// Strict descendants in pre-order.
    fn descendants_of(&self, id: Uuid)
    -> impl Future<Output = ShortlinkResult<Vec<Role>>> + Send;
    fn is_descendant(
        &self,
        candidate_id: Uuid,
        ancestor_id: Uuid,
    ) -> impl Future<Output = ShortlinkResult<bool>> + Send;
    /// Recompute every bound from parent pointers. Returns the number of
    /// roles whose bounds changed.
    fn rebuild(&self) -> impl Future<Output = ShortlinkResult<usize>> + Send;
}

// ---------------------------------------------------------------------------
// Permission matrix
// ---------------------------------------------------------------------------

pub trait PermissionRepository: Send + Sync {
    /// Scopes of the pair; empty when no row exists.
    fn get(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
    ) -> impl Future<Output = ShortlinkResult<Scopes>> + Send;
    /// Upsert.
    fn set(&self, input: SetPermission)
    -> impl Future<Output = ShortlinkResult<Permission>> + Send;
    /// Read-modify-write of one scope bit.
    fn toggle(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        scope: Scopes,
    ) -> impl Future<Output = ShortlinkResult<Permission>> + Send;
    fn delete_for_role(&self, role_id: Uuid) -> impl Future<Output = ShortlinkResult<u64>> + Send;
    fn delete_for_resource(
        &self,
        resource_id: Uuid,
    ) -> impl Future<Output = ShortlinkResult<u64>> + Send;
    /// Every row, ordered by (role, resource).
    fn snapshot(&self) -> impl Future<Output = ShortlinkResult<Vec<Permission>>> + Send;
    /// Replace the whole matrix in one transaction. On failure the
    /// previously stored rows are untouched.
    fn save(
        &self,
        entries: Vec<SetPermission>,
    ) -> impl Future<Output = ShortlinkResult<Vec<Permission>>> + Send;
    /// Version of the whole RBAC configuration. Any resource, role or
    /// permission write moves it forward, so evaluators can cache a
    /// snapshot until it changes.
    fn config_version(&self) -> impl Future<Output = ShortlinkResult<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_to_offset() {
        let p = Pagination::from_page(3, 20);
        assert_eq!((p.offset, p.limit), (40, 20));
        let p = Pagination::from_page(0, 0);
        assert_eq!((p.offset, p.limit), (0, 1));
    }
}
