//! Integration tests for the Role repository (nested-set hierarchy) using
//! in-memory SurrealDB.

use shortlink_core::error::ShortlinkError;
use shortlink_core::models::permission::SetPermission;
use shortlink_core::models::resource::CreateResource;
use shortlink_core::models::role::{CreateRole, Role, UpdateRole};
use shortlink_core::models::scope::Scopes;
use shortlink_core::repository::{PermissionRepository, ResourceRepository, RoleRepository};
use shortlink_db::repository::{
    SurrealPermissionRepository, SurrealResourceRepository, SurrealRoleRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> (Surreal<Db>, SurrealRoleRepository<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    shortlink_db::run_migrations(&db).await.unwrap();
    let roles = SurrealRoleRepository::new(db.clone());
    (db, roles)
}

async fn create(repo: &SurrealRoleRepository<Db>, name: &str, level: i32, parent: Option<Uuid>) -> Role {
    repo.create(CreateRole {
        name: name.into(),
        level,
        parent_id: parent,
    })
    .await
    .unwrap()
}

/// Every stored role satisfies `lft < rgt`, and the stored bounds agree
/// with a walk over parent pointers.
async fn assert_consistent(repo: &SurrealRoleRepository<Db>) {
    let roles = repo.list().await.unwrap();
    for role in &roles {
        assert!(role.lft < role.rgt, "{} has lft >= rgt", role.name);
    }
    for candidate in &roles {
        for ancestor in &roles {
            let mut walk = candidate.parent_id;
            let mut naive = false;
            while let Some(parent) = walk {
                if parent == ancestor.id {
                    naive = true;
                    break;
                }
                walk = roles.iter().find(|r| r.id == parent).and_then(|r| r.parent_id);
            }
            let stored = repo.is_descendant(candidate.id, ancestor.id).await.unwrap();
            assert_eq!(stored, naive, "{} under {}", candidate.name, ancestor.name);
        }
    }
}

// -----------------------------------------------------------------------
// Create
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_assigns_nested_bounds() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    assert_eq!((admin.lft, admin.rgt), (1, 2));

    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    assert_eq!((editor.lft, editor.rgt), (2, 3));
    assert_eq!(editor.parent_id, Some(admin.id));

    let admin = repo.get_by_id(admin.id).await.unwrap();
    assert_eq!((admin.lft, admin.rgt), (1, 4));

    let viewer = create(&repo, "Viewer", 1, None).await;
    assert_eq!((viewer.lft, viewer.rgt), (5, 6));
    assert_consistent(&repo).await;
}

#[tokio::test]
async fn create_with_unknown_parent_fails() {
    let (_db, repo) = setup().await;

    let err = repo
        .create(CreateRole {
            name: "Orphan".into(),
            level: 0,
            parent_id: Some(Uuid::new_v4()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
    assert!(repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_with_blank_name_fails() {
    let (_db, repo) = setup().await;

    let err = repo
        .create(CreateRole {
            name: "  ".into(),
            level: 0,
            parent_id: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

// -----------------------------------------------------------------------
// Traversal
// -----------------------------------------------------------------------

#[tokio::test]
async fn ancestors_and_descendants() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let intern = create(&repo, "Intern", 1, Some(editor.id)).await;
    let auditor = create(&repo, "Auditor", 5, Some(admin.id)).await;

    let ancestors: Vec<Uuid> = repo
        .ancestors_of(intern.id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ancestors, [editor.id, admin.id]);

    let descendants: Vec<Uuid> = repo
        .descendants_of(admin.id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(descendants, [editor.id, intern.id, auditor.id]);

    assert!(repo.is_descendant(intern.id, admin.id).await.unwrap());
    assert!(!repo.is_descendant(admin.id, intern.id).await.unwrap());
    assert!(!repo.is_descendant(auditor.id, editor.id).await.unwrap());
    assert!(!repo.is_descendant(admin.id, admin.id).await.unwrap());
    assert!(!repo.is_descendant(Uuid::new_v4(), admin.id).await.unwrap());

    let err = repo.ancestors_of(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Update / re-parent
// -----------------------------------------------------------------------

#[tokio::test]
async fn update_name_and_level() {
    let (_db, repo) = setup().await;
    let editor = create(&repo, "Editor", 10, None).await;

    let updated = repo
        .update(
            editor.id,
            UpdateRole {
                name: Some("Senior Editor".into()),
                level: Some(20),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Senior Editor");
    assert_eq!(updated.level, 20);
    assert_eq!((updated.lft, updated.rgt), (editor.lft, editor.rgt));
}

#[tokio::test]
async fn reparent_moves_subtree() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let intern = create(&repo, "Intern", 1, Some(editor.id)).await;
    let ops = create(&repo, "Ops", 50, None).await;

    let moved = repo
        .update(
            editor.id,
            UpdateRole {
                parent_id: Some(Some(ops.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.parent_id, Some(ops.id));

    assert!(repo.is_descendant(intern.id, ops.id).await.unwrap());
    assert!(!repo.is_descendant(intern.id, admin.id).await.unwrap());
    assert_consistent(&repo).await;

    // Back to the top level.
    let root = repo
        .update(
            editor.id,
            UpdateRole {
                parent_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(root.parent_id, None);
    assert!(repo.ancestors_of(editor.id).await.unwrap().is_empty());
    assert_consistent(&repo).await;
}

#[tokio::test]
async fn cyclic_parent_is_rejected_and_tree_unchanged() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let intern = create(&repo, "Intern", 1, Some(editor.id)).await;
    let before = repo.list().await.unwrap();

    for parent in [admin.id, intern.id] {
        let err = repo
            .update(
                admin.id,
                UpdateRole {
                    parent_id: Some(Some(parent)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShortlinkError::CyclicParent { .. }));
    }

    assert_eq!(repo.list().await.unwrap(), before);
}

// -----------------------------------------------------------------------
// Delete
// -----------------------------------------------------------------------

#[tokio::test]
async fn delete_reparents_children_and_drops_permissions() {
    let (db, repo) = setup().await;
    let resources = SurrealResourceRepository::new(db.clone());
    let permissions = SurrealPermissionRepository::new(db);

    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let intern = create(&repo, "Intern", 1, Some(editor.id)).await;
    let links = resources
        .create(CreateResource {
            key: "links".into(),
            description: None,
        })
        .await
        .unwrap();
    permissions
        .set(SetPermission {
            role_id: editor.id,
            resource_id: links.id,
            scopes: Scopes::READ | Scopes::UPDATE,
            description: None,
        })
        .await
        .unwrap();

    repo.delete(editor.id).await.unwrap();

    let err = repo.get_by_id(editor.id).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
    let intern = repo.get_by_id(intern.id).await.unwrap();
    assert_eq!(intern.parent_id, Some(admin.id));
    assert!(repo.is_descendant(intern.id, admin.id).await.unwrap());
    assert!(permissions.snapshot().await.unwrap().is_empty());
    assert_consistent(&repo).await;
}

#[tokio::test]
async fn moved_children_are_touched_on_delete() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let intern = create(&repo, "Intern", 1, Some(editor.id)).await;
    let admin = repo.get_by_id(admin.id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    repo.delete(editor.id).await.unwrap();

    // New parent: touched.
    let moved = repo.get_by_id(intern.id).await.unwrap();
    assert_eq!(moved.parent_id, Some(admin.id));
    assert!(moved.updated_at > intern.updated_at);

    // Bounds shrank but the parent did not change.
    let shrunk = repo.get_by_id(admin.id).await.unwrap();
    assert_ne!(shrunk.rgt, admin.rgt);
    assert_eq!(shrunk.updated_at, admin.updated_at);
}

#[tokio::test]
async fn delete_root_promotes_children() {
    let (_db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;
    let auditor = create(&repo, "Auditor", 5, Some(admin.id)).await;

    repo.delete(admin.id).await.unwrap();

    for id in [editor.id, auditor.id] {
        assert_eq!(repo.get_by_id(id).await.unwrap().parent_id, None);
    }
    assert_consistent(&repo).await;

    let err = repo.delete(admin.id).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Rebuild
// -----------------------------------------------------------------------

#[tokio::test]
async fn rebuild_repairs_corrupted_bounds() {
    let (db, repo) = setup().await;
    let admin = create(&repo, "Admin", 100, None).await;
    let editor = create(&repo, "Editor", 10, Some(admin.id)).await;

    db.query("UPDATE type::record('role', $id) SET lft = 40, rgt = 41")
        .bind(("id", editor.id.to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();
    assert!(!repo.is_descendant(editor.id, admin.id).await.unwrap());

    let repaired = repo.rebuild().await.unwrap();
    assert!(repaired > 0);
    assert!(repo.is_descendant(editor.id, admin.id).await.unwrap());
    assert_consistent(&repo).await;

    assert_eq!(repo.rebuild().await.unwrap(), 0);
}
