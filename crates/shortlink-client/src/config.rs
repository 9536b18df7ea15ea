//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL without a trailing slash.
    pub base_url: String,
    /// Path of the token refresh endpoint, relative to `base_url`.
    pub refresh_path: String,
    /// Per-request timeout in seconds (default: 30).
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            refresh_path: "/identity/auth/refresh".into(),
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn refresh_url(&self) -> String {
        self.url(&self.refresh_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slash() {
        let config = ClientConfig::with_base_url("http://api.local/");
        assert_eq!(config.url("/roles"), "http://api.local/roles");
        assert_eq!(
            config.refresh_url(),
            "http://api.local/identity/auth/refresh"
        );
    }
}
