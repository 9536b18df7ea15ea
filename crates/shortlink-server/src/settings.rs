//! Server settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `SHORTLINK__`-prefixed environment variables
//! (`SHORTLINK__SERVER__PORT=9090`, `SHORTLINK__DATABASE__URL=mem://`).

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use shortlink_db::DbConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DbConfig,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Static bearer tokens accepted by the API. Empty disables the check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub bearer_tokens: Vec<String>,
}

impl AuthSettings {
    pub fn is_enabled(&self) -> bool {
        !self.bearer_tokens.is_empty()
    }

    pub fn accepts(&self, token: &str) -> bool {
        self.bearer_tokens.iter().any(|known| known == token)
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let server = ServerSettings::default();
        let database = DbConfig::default();

        let mut builder = Config::builder()
            .set_default("server.host", server.host)?
            .set_default("server.port", server.port)?
            .set_default("database.url", database.url)?
            .set_default("database.namespace", database.namespace)?
            .set_default("database.database", database.database)?;

        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("SHORTLINK")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.bearer_tokens")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
