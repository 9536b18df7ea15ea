//! Integration tests for the Resource repository using in-memory SurrealDB.

use shortlink_core::error::ShortlinkError;
use shortlink_core::models::permission::SetPermission;
use shortlink_core::models::resource::{CreateResource, ResourceFilter, UpdateResource};
use shortlink_core::models::role::CreateRole;
use shortlink_core::models::scope::Scopes;
use shortlink_core::repository::{
    Pagination, PermissionRepository, ResourceRepository, RoleRepository,
};
use shortlink_db::repository::{
    SurrealPermissionRepository, SurrealResourceRepository, SurrealRoleRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    shortlink_db::run_migrations(&db).await.unwrap();
    db
}

fn resource(key: &str) -> CreateResource {
    CreateResource {
        key: key.into(),
        description: None,
    }
}

// -----------------------------------------------------------------------
// Create / read
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_resource() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);

    let created = repo
        .create(CreateResource {
            key: "links".into(),
            description: Some("Short links".into()),
        })
        .await
        .unwrap();
    assert_eq!(created.key, "links");
    assert_eq!(created.description.as_deref(), Some("Short links"));

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let by_key = repo.find_by_key("links").await.unwrap();
    assert_eq!(by_key.id, created.id);
}

#[tokio::test]
async fn find_by_key_is_case_sensitive() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);
    repo.create(resource("links")).await.unwrap();

    let err = repo.find_by_key("Links").await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}

#[tokio::test]
async fn duplicate_and_empty_keys_are_rejected() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);
    repo.create(resource("links")).await.unwrap();

    let err = repo.create(resource("links")).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::DuplicateKey { ref key, .. } if key == "links"));

    let err = repo.create(resource("")).await.unwrap_err();
    assert!(err.is_validation());

    let all = repo.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn get_unknown_resource_is_not_found() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);

    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Update
// -----------------------------------------------------------------------

#[tokio::test]
async fn update_resource_fields() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);
    let created = repo.create(resource("links")).await.unwrap();

    let updated = repo
        .update(
            created.id,
            UpdateResource {
                key: Some("short-links".into()),
                description: Some(Some("Renamed".into())),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.key, "short-links");
    assert_eq!(updated.description.as_deref(), Some("Renamed"));
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.created_at, created.created_at);

    // Keeping its own key is not a conflict.
    let same = repo
        .update(
            created.id,
            UpdateResource {
                key: Some("short-links".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(same.description.as_deref(), Some("Renamed"));

    let cleared = repo
        .update(
            created.id,
            UpdateResource {
                key: None,
                description: Some(None),
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.key, "short-links");
}

#[tokio::test]
async fn update_to_taken_key_fails_without_change() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);
    repo.create(resource("links")).await.unwrap();
    let tenants = repo.create(resource("tenants")).await.unwrap();

    let err = repo
        .update(
            tenants.id,
            UpdateResource {
                key: Some("links".into()),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShortlinkError::DuplicateKey { .. }));

    let unchanged = repo.get_by_id(tenants.id).await.unwrap();
    assert_eq!(unchanged.key, "tenants");
}

#[tokio::test]
async fn update_unknown_resource_is_not_found() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);

    let err = repo
        .update(Uuid::new_v4(), UpdateResource::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// List
// -----------------------------------------------------------------------

#[tokio::test]
async fn list_filters_and_paginates() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);
    for key in ["links", "tenants", "link-stats", "billing"] {
        repo.create(resource(key)).await.unwrap();
    }

    let all = repo
        .list(ResourceFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 4);
    let keys: Vec<&str> = all.items.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, ["billing", "link-stats", "links", "tenants"]);

    let filtered = repo
        .list(
            ResourceFilter {
                key: Some("link".into()),
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(filtered.total, 2);

    let page = repo
        .list(
            ResourceFilter::default(),
            Pagination {
                offset: 1,
                limit: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].key, "link-stats");
}

// -----------------------------------------------------------------------
// Delete
// -----------------------------------------------------------------------

#[tokio::test]
async fn delete_cascades_to_permissions() {
    let db = setup().await;
    let resources = SurrealResourceRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db.clone());
    let permissions = SurrealPermissionRepository::new(db);

    let links = resources.create(resource("links")).await.unwrap();
    let tenants = resources.create(resource("tenants")).await.unwrap();
    let editor = roles
        .create(CreateRole {
            name: "Editor".into(),
            level: 10,
            parent_id: None,
        })
        .await
        .unwrap();
    for resource_id in [links.id, tenants.id] {
        permissions
            .set(SetPermission {
                role_id: editor.id,
                resource_id,
                scopes: Scopes::READ,
                description: None,
            })
            .await
            .unwrap();
    }

    resources.delete(links.id).await.unwrap();

    let err = resources.find_by_key("links").await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
    let remaining = permissions.snapshot().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].resource_id, tenants.id);
}

#[tokio::test]
async fn delete_unknown_resource_is_not_found() {
    let db = setup().await;
    let repo = SurrealResourceRepository::new(db);

    let err = repo.delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ShortlinkError::NotFound { .. }));
}
