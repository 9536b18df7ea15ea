//! Authorization evaluator.
//!
//! A role's effective scopes on a resource are the union of its own
//! scopes and those of every ancestor. Inheritance is monotonic: there is
//! no explicit deny. Unknown roles and unknown resource keys are denied.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ShortlinkError, ShortlinkResult};
use crate::hierarchy::RoleTree;
use crate::matrix::PermissionMatrix;
use crate::models::permission::Permission;
use crate::models::resource::Resource;
use crate::models::role::Role;
use crate::models::scope::{Operation, Scopes};
use crate::repository::{PermissionRepository, ResourceRepository, RoleRepository};

/// Fold the scopes held along a role chain.
pub fn effective_mask(chain: impl IntoIterator<Item = Scopes>) -> Scopes {
    chain.into_iter().fold(Scopes::empty(), |acc, scopes| acc | scopes)
}

/// Result of an access check as exchanged over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub role_id: Uuid,
    pub resource: String,
    pub operation: Operation,
    pub allowed: bool,
}

/// Point-in-time view of resources, roles and permissions, evaluated
/// without further I/O.
#[derive(Debug, Clone, Default)]
pub struct RbacSnapshot {
    resources: HashMap<String, Resource>,
    tree: RoleTree,
    matrix: PermissionMatrix,
}

impl RbacSnapshot {
    pub fn new(
        resources: Vec<Resource>,
        roles: Vec<Role>,
        permissions: Vec<Permission>,
    ) -> ShortlinkResult<Self> {
        let mut by_key = HashMap::with_capacity(resources.len());
        for resource in resources {
            if let Some(previous) = by_key.insert(resource.key.clone(), resource) {
                return Err(ShortlinkError::DuplicateKey {
                    entity: "resource".into(),
                    key: previous.key,
                });
            }
        }
        Ok(Self {
            resources: by_key,
            tree: RoleTree::from_roles(roles)?,
            matrix: PermissionMatrix::from_permissions(permissions)?,
        })
    }

    pub fn tree(&self) -> &RoleTree {
        &self.tree
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    pub fn resource(&self, key: &str) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn into_parts(self) -> (Vec<Resource>, RoleTree, PermissionMatrix) {
        (self.resources.into_values().collect(), self.tree, self.matrix)
    }

    /// Union of the role's own scopes and its ancestors'. Empty for an
    /// unknown role.
    pub fn effective_scopes(&self, role_id: Uuid, resource_id: Uuid) -> Scopes {
        match self.tree.lineage(role_id) {
            Ok(chain) => effective_mask(
                chain
                    .into_iter()
                    .map(|role| self.matrix.get(role.id, resource_id)),
            ),
            Err(_) => Scopes::empty(),
        }
    }

    /// Effective scope count for the "n/4" matrix view.
    pub fn effective_count(&self, role_id: Uuid, resource_id: Uuid) -> u32 {
        self.effective_scopes(role_id, resource_id).count_set()
    }

    pub fn can(&self, role_id: Uuid, resource_key: &str, operation: Operation) -> bool {
        let Some(resource) = self.resources.get(resource_key) else {
            debug!(%role_id, resource_key, %operation, "Denied: unknown resource");
            return false;
        };
        let allowed = self
            .effective_scopes(role_id, resource.id)
            .has_scope(operation.scope());
        debug!(%role_id, resource_key, %operation, allowed, "Evaluated access");
        allowed
    }
}

/// Snapshot tagged with the config version read before it was loaded.
struct CachedSnapshot {
    version: u64,
    snapshot: Arc<RbacSnapshot>,
}

/// Authorization service backed by the repositories.
///
/// Generic over repository implementations so that evaluation has no
/// dependency on the storage crate. Checks run against a cached
/// [`RbacSnapshot`] that is reloaded whenever the stored config version
/// moves.
pub struct AuthorizationService<Res: ResourceRepository, Ro: RoleRepository, P: PermissionRepository>
{
    resources: Res,
    roles: Ro,
    permissions: P,
    cache: RwLock<Option<CachedSnapshot>>,
}

impl<Res: ResourceRepository, Ro: RoleRepository, P: PermissionRepository>
    AuthorizationService<Res, Ro, P>
{
    pub fn new(resources: Res, roles: Ro, permissions: P) -> Self {
        Self {
            resources,
            roles,
            permissions,
            cache: RwLock::new(None),
        }
    }

    /// Snapshot at the current config version. Costs one version read
    /// while nothing has been written since the last load.
    pub async fn snapshot(&self) -> ShortlinkResult<Arc<RbacSnapshot>> {
        let version = self.permissions.config_version().await?;
        let cached = self
            .cache
            .read()
            .as_ref()
            .filter(|cached| cached.version == version)
            .map(|cached| Arc::clone(&cached.snapshot));
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        // The version is read first, so data written meanwhile is at worst
        // tagged too old and loaded again on the next check.
        let resources = self.resources.list_all().await?;
        let roles = self.roles.list().await?;
        let permissions = self.permissions.snapshot().await?;
        let snapshot = Arc::new(RbacSnapshot::new(resources, roles, permissions)?);

        let mut cache = self.cache.write();
        if cache.as_ref().is_none_or(|cached| cached.version <= version) {
            *cache = Some(CachedSnapshot {
                version,
                snapshot: Arc::clone(&snapshot),
            });
        }
        debug!(version, "RBAC snapshot loaded");
        Ok(snapshot)
    }

    /// Effective scopes of `role_id` on `resource_id`. Empty for an
    /// unknown role.
    pub async fn effective_scopes(&self, role_id: Uuid, resource_id: Uuid) -> ShortlinkResult<Scopes> {
        Ok(self.snapshot().await?.effective_scopes(role_id, resource_id))
    }

    /// Decide whether `role_id` may perform `operation` on the resource
    /// named `resource_key`. Storage failures are errors, not denials.
    pub async fn can(
        &self,
        role_id: Uuid,
        resource_key: &str,
        operation: Operation,
    ) -> ShortlinkResult<bool> {
        Ok(self.snapshot().await?.can(role_id, resource_key, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource(key: &str) -> Resource {
        let now = Utc::now();
        Resource {
            id: Uuid::new_v4(),
            key: key.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn role(name: &str, level: i32, parent_id: Option<Uuid>) -> Role {
        let now = Utc::now();
        Role {
            id: Uuid::new_v4(),
            name: name.into(),
            level,
            parent_id,
            lft: 0,
            rgt: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn grant(
        matrix: &mut PermissionMatrix,
        role_id: Uuid,
        resource_id: Uuid,
        scopes: Scopes,
    ) -> Permission {
        matrix.set(crate::models::permission::SetPermission {
            role_id,
            resource_id,
            scopes,
            description: None,
        })
    }

    /// Admin (100) -> Editor (10) -> Intern (1); `links` and `tenants`.
    fn fixture() -> (RbacSnapshot, Role, Role, Role, Resource) {
        let links = resource("links");
        let tenants = resource("tenants");

        let mut tree = RoleTree::new();
        let admin = role("Admin", 100, None);
        let editor = role("Editor", 10, Some(admin.id));
        let intern = role("Intern", 1, Some(editor.id));
        tree.insert(admin.clone()).unwrap();
        tree.insert(editor.clone()).unwrap();
        tree.insert(intern.clone()).unwrap();

        let mut matrix = PermissionMatrix::new();
        grant(&mut matrix, editor.id, links.id, Scopes::READ | Scopes::UPDATE);
        grant(&mut matrix, admin.id, links.id, Scopes::DELETE);
        grant(&mut matrix, intern.id, tenants.id, Scopes::READ);

        let snapshot = RbacSnapshot::new(
            vec![links.clone(), tenants],
            tree.into_roles(),
            matrix.snapshot(),
        )
        .unwrap();
        (snapshot, admin, editor, intern, links)
    }

    #[test]
    fn own_scopes_apply() {
        let (snapshot, _, editor, _, _) = fixture();
        assert!(snapshot.can(editor.id, "links", Operation::Read));
        assert!(snapshot.can(editor.id, "links", Operation::Update));
        assert!(!snapshot.can(editor.id, "links", Operation::Create));
    }

    #[test]
    fn ancestor_scopes_are_inherited_downward() {
        let (snapshot, admin, editor, intern, links) = fixture();
        assert!(snapshot.can(editor.id, "links", Operation::Delete));
        assert!(snapshot.can(intern.id, "links", Operation::Delete));
        assert!(snapshot.can(intern.id, "links", Operation::Update));
        assert_eq!(snapshot.effective_count(intern.id, links.id), 3);

        // Never upward.
        assert!(!snapshot.can(admin.id, "links", Operation::Update));
        assert!(!snapshot.can(editor.id, "tenants", Operation::Read));
    }

    #[test]
    fn fail_closed() {
        let (snapshot, admin, _, _, _) = fixture();
        assert!(!snapshot.can(Uuid::new_v4(), "links", Operation::Read));
        assert!(!snapshot.can(admin.id, "billing", Operation::Read));
        assert!(!snapshot.can(admin.id, "Links", Operation::Delete));
        assert!(!snapshot.can(admin.id, "tenants", Operation::Read));
    }

    #[test]
    fn matches_union_over_chain() {
        let (snapshot, _, _, intern, links) = fixture();
        let chain = snapshot.tree().lineage(intern.id).unwrap();
        for op in Operation::ALL {
            let any = chain
                .iter()
                .any(|r| snapshot.matrix().get(r.id, links.id).has_scope(op.scope()));
            assert_eq!(snapshot.can(intern.id, "links", op), any);
        }
    }

    #[test]
    fn duplicate_resource_keys_are_rejected() {
        let err = RbacSnapshot::new(vec![resource("links"), resource("links")], vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, ShortlinkError::DuplicateKey { .. }));
    }

    #[test]
    fn effective_mask_is_a_union() {
        assert_eq!(effective_mask([]), Scopes::empty());
        assert_eq!(
            effective_mask([Scopes::READ, Scopes::UPDATE, Scopes::READ]),
            Scopes::READ | Scopes::UPDATE
        );
    }
}
