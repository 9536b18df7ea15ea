//! Role domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ShortlinkError, ShortlinkResult};
use crate::models::double_option;

/// A named position in the privilege hierarchy.
///
/// `lft`/`rgt` are nested-set bounds maintained by
/// [`RoleTree`](crate::hierarchy::RoleTree); callers should use the tree's
/// traversal primitives instead of comparing bounds themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    /// Higher is more privileged.
    pub level: i32,
    pub parent_id: Option<Uuid>,
    pub lft: i64,
    pub rgt: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

/// Fields that can be updated on an existing role.
///
/// `parent_id: Some(None)` moves the role to the top level;
/// `None` leaves the parent untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(
        default,
        deserialize_with = "double_option::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<Uuid>>,
}

pub fn validate_name(name: &str) -> ShortlinkResult<()> {
    if name.trim().is_empty() {
        return Err(ShortlinkError::validation("role name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_name("Editor").is_ok());
        assert!(validate_name(" ").unwrap_err().is_validation());
    }

    #[test]
    fn update_distinguishes_absent_and_null_parent() {
        let absent: UpdateRole = serde_json::from_str(r#"{"name":"ops"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: UpdateRole = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let id = Uuid::new_v4();
        let moved: UpdateRole =
            serde_json::from_value(serde_json::json!({ "parent_id": id })).unwrap();
        assert_eq!(moved.parent_id, Some(Some(id)));
    }

    #[test]
    fn update_serializes_cleared_parent_as_null() {
        let update = UpdateRole {
            parent_id: Some(None),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "parent_id": null })
        );
    }
}
