//! Domain models for Shortlink RBAC.
//!
//! These are the core types shared across all crates.

pub mod permission;
pub mod resource;
pub mod role;
pub mod scope;

/// Serde helper for `Option<Option<T>>` update fields: a missing field
/// stays `None`, an explicit `null` becomes `Some(None)`.
pub mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
