//! Resource domain model.
//!
//! A resource is a named, protected capability domain (e.g. `links`,
//! `tenants`) that permissions are defined over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ShortlinkError, ShortlinkResult};
use crate::models::double_option;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    /// Stable, human-readable identifier. Case-sensitive and unique.
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResource {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// `Some(None)` (an explicit `null`) clears the description.
    #[serde(
        default,
        deserialize_with = "double_option::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
}

/// Filters accepted by resource listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceFilter {
    /// Case-sensitive substring match on the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ResourceFilter {
    pub fn matches(&self, resource: &Resource) -> bool {
        self.key
            .as_deref()
            .is_none_or(|needle| resource.key.contains(needle))
    }
}

/// Keys must be non-empty and carry no surrounding whitespace.
pub fn validate_key(key: &str) -> ShortlinkResult<()> {
    if key.trim().is_empty() {
        return Err(ShortlinkError::validation("resource key must not be empty"));
    }
    if key.trim() != key {
        return Err(ShortlinkError::validation(format!(
            "resource key `{key}` has surrounding whitespace"
        )));
    }
    Ok(())
}
