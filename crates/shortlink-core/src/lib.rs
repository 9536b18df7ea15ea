//! Shortlink core: RBAC domain types and evaluation.
//!
//! - Scope bitmask and operations ([`models::scope`])
//! - Role hierarchy maintained as a nested set ([`hierarchy::RoleTree`])
//! - Permission matrix ([`matrix::PermissionMatrix`])
//! - Authorization evaluator ([`authz`])
//! - Repository traits implemented by the storage crate ([`repository`])
//! - Wire envelope shared by server and client ([`envelope`])

pub mod authz;
pub mod envelope;
pub mod error;
pub mod hierarchy;
pub mod matrix;
pub mod models;
pub mod repository;

pub use error::{ShortlinkError, ShortlinkResult};
