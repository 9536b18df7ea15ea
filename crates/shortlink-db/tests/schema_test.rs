//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

async fn migrated() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    shortlink_db::run_migrations(&db).await.unwrap();
    db
}

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = migrated().await;

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    assert!(info_str.contains("resource"), "missing resource table");
    assert!(info_str.contains("role"), "missing role table");
    assert!(info_str.contains("permission"), "missing permission table");
    assert!(info_str.contains("_migration"), "missing _migration table");
    assert!(info_str.contains("rbac_version"), "missing rbac_version table");
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    shortlink_db::run_migrations(&db).await.unwrap();
    shortlink_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 2, "expected one record per migration");
}

#[tokio::test]
async fn unique_index_prevents_duplicate_resource_keys() {
    let db = migrated().await;

    db.query("CREATE resource SET key = 'links'")
        .await
        .unwrap()
        .check()
        .unwrap();

    let result = db
        .query("CREATE resource SET key = 'links'")
        .await
        .unwrap()
        .check();
    assert!(result.is_err(), "duplicate key should be rejected");

    // Keys are case-sensitive.
    db.query("CREATE resource SET key = 'Links'")
        .await
        .unwrap()
        .check()
        .unwrap();
}

#[tokio::test]
async fn unique_index_prevents_duplicate_permission_pairs() {
    let db = migrated().await;

    let insert = "CREATE permission SET role_id = 'r', resource_id = 'x', scopes = 1";
    db.query(insert).await.unwrap().check().unwrap();
    let result = db.query(insert).await.unwrap().check();
    assert!(result.is_err(), "second row for a pair should be rejected");
}

#[tokio::test]
async fn reserved_scope_bits_are_rejected() {
    let db = migrated().await;

    let result = db
        .query("CREATE permission SET role_id = 'r', resource_id = 'x', scopes = 16")
        .await
        .unwrap()
        .check();
    assert!(result.is_err(), "scope bit 4 is reserved");
}
