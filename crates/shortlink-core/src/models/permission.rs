//! Permission domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::scope::Scopes;

/// Namespace for deriving permission ids from their (role, resource) pair.
const PERMISSION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c4e_8a3b_5d7f_9e0a_1b2c_3d4e_5f60);

/// The scope bitmask a role holds over a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub resource_id: Uuid,
    pub scopes: Scopes,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Row identity of a (role, resource) pair. Every store derives the
    /// same id, so a pair can never map to two rows.
    pub fn id_for(role_id: Uuid, resource_id: Uuid) -> Uuid {
        let mut name = [0u8; 32];
        name[..16].copy_from_slice(role_id.as_bytes());
        name[16..].copy_from_slice(resource_id.as_bytes());
        Uuid::new_v5(&PERMISSION_NAMESPACE, &name)
    }

    pub fn pair(&self) -> (Uuid, Uuid) {
        (self.role_id, self.resource_id)
    }
}

/// Upsert input: assign `scopes` to the (role, resource) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPermission {
    pub role_id: Uuid,
    pub resource_id: Uuid,
    pub scopes: Scopes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Permission> for SetPermission {
    fn from(permission: &Permission) -> Self {
        Self {
            role_id: permission.role_id,
            resource_id: permission.resource_id,
            scopes: permission.scopes,
            description: permission.description.clone(),
        }
    }
}
