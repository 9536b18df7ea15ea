//! SurrealDB connection management.

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Endpoint URL, e.g. `ws://127.0.0.1:8000` or `mem://` for an
    /// embedded in-memory store.
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username; sign-in is skipped when unset or for `mem://`.
    pub username: Option<String>,
    /// Root password.
    pub password: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000".into(),
            namespace: "shortlink".into(),
            database: "rbac".into(),
            username: Some("root".into()),
            password: Some("root".into()),
        }
    }
}

impl DbConfig {
    /// Whether the URL names the embedded in-memory engine, which has no
    /// users to sign in as.
    pub fn is_embedded(&self) -> bool {
        self.url.starts_with("mem://")
    }

    /// Root credentials to sign in with, if any apply.
    fn root_credentials(&self) -> Option<Root> {
        if self.is_embedded() {
            return None;
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Root {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Embedded in-memory store, without credentials.
    pub fn memory() -> Self {
        Self {
            url: "mem://".into(),
            username: None,
            password: None,
            ..Self::default()
        }
    }
}

/// Manages a connection to SurrealDB.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    /// Connect to SurrealDB using the provided configuration.
    ///
    /// Authenticates as root when credentials are configured (never for
    /// the embedded engine), selects the
    /// configured namespace and database, and returns a ready-to-use
    /// manager.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.url.as_str()).await?;

        if let Some(credentials) = config.root_credentials() {
            db.signin(credentials).await?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Successfully connected to SurrealDB");

        Ok(Self { db })
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_engine_skips_sign_in() {
        let config = DbConfig {
            url: "mem://".into(),
            ..DbConfig::default()
        };
        assert!(config.username.is_some());
        assert!(config.is_embedded());
        assert!(config.root_credentials().is_none());
    }

    #[test]
    fn remote_engine_signs_in_when_configured() {
        let config = DbConfig::default();
        assert!(!config.is_embedded());
        assert!(config.root_credentials().is_some());

        let anonymous = DbConfig {
            username: None,
            ..DbConfig::default()
        };
        assert!(anonymous.root_credentials().is_none());
    }
}
