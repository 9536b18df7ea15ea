//! Connecting through `DbManager` with the configured engine URL.

use shortlink_db::{DbConfig, DbManager};

#[tokio::test]
async fn embedded_store_ignores_default_root_credentials() {
    // Defaults carry root credentials meant for a remote server.
    let config = DbConfig {
        url: "mem://".into(),
        ..DbConfig::default()
    };
    let manager = DbManager::connect(&config).await.unwrap();
    shortlink_db::run_migrations(manager.client()).await.unwrap();

    let mut result = manager
        .client()
        .query("SELECT version FROM type::record('rbac_version', 'current')")
        .await
        .unwrap();
    let versions: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(versions.len(), 1);
}
