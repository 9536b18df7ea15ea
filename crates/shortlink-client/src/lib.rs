//! Shortlink client: talks to the RBAC HTTP API.
//!
//! - Authenticated transport with single-flight token refresh
//!   ([`HttpClient`])
//! - Token storage abstraction ([`TokenStore`], [`MemoryTokenStore`])
//! - Typed RBAC endpoints ([`RbacApi`])
//! - Permission-matrix editing with optimistic local edits and batched
//!   saves ([`PermissionEditor`])

pub mod api;
pub mod config;
pub mod editor;
pub mod error;
pub mod http;
pub mod token;

pub use api::RbacApi;
pub use config::ClientConfig;
pub use editor::PermissionEditor;
pub use error::ClientError;
pub use http::HttpClient;
pub use token::{MemoryTokenStore, TokenStore};
