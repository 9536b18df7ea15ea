//! Token storage.
//!
//! The client holds two tokens (access and refresh) plus the numeric
//! tenant the refresh call is made for. Where they live is up to the
//! embedding application.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn tenant_id(&self) -> Option<i64>;
    fn set_access_token(&self, token: String);
    /// Forget both tokens (forced logout).
    fn clear(&self);
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
    tenant_id: Option<i64>,
}

/// Process-local [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Tokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: impl Into<String>, refresh: impl Into<String>, tenant_id: i64) -> Self {
        Self {
            tokens: RwLock::new(Tokens {
                access: Some(access.into()),
                refresh: Some(refresh.into()),
                tenant_id: Some(tenant_id),
            }),
        }
    }

    /// Store a freshly issued token pair after login.
    pub fn set_tokens(&self, access: String, refresh: String, tenant_id: i64) {
        *self.tokens.write() = Tokens {
            access: Some(access),
            refresh: Some(refresh),
            tenant_id: Some(tenant_id),
        };
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh.clone()
    }

    fn tenant_id(&self) -> Option<i64> {
        self.tokens.read().tenant_id
    }

    fn set_access_token(&self, token: String) {
        self.tokens.write().access = Some(token);
    }

    fn clear(&self) {
        let mut tokens = self.tokens.write();
        tokens.access = None;
        tokens.refresh = None;
    }
}

/// Body of the refresh call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub tenant_id: i64,
}

/// `data` of a successful refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_tenant() {
        let store = MemoryTokenStore::with_tokens("a", "r", 7);
        store.set_access_token("b".into());
        assert_eq!(store.access_token().as_deref(), Some("b"));

        store.clear();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert_eq!(store.tenant_id(), Some(7));
    }
}
