//! SurrealDB repository implementations.

use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::is_retryable;

mod permission;
mod resource;
mod role;

pub use permission::SurrealPermissionRepository;
pub use resource::SurrealResourceRepository;
pub use role::SurrealRoleRepository;

/// Statement bumping the RBAC config version. Appended to every write so
/// cached evaluators notice the change.
const BUMP_VERSION: &str =
    "UPSERT type::record('rbac_version', 'current') SET version += 1;";

/// Attempts for a write that keeps losing transaction conflicts.
const WRITE_ATTEMPTS: u32 = 5;

/// Run a write, re-running it while SurrealDB reports a retryable
/// conflict. Every write touches the version row, so concurrent writes
/// through different repositories can collide.
async fn write_retrying<T, F, Fut>(mut write: F) -> Result<T, surrealdb::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, surrealdb::Error>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Err(e) if attempt < WRITE_ATTEMPTS && is_retryable(&e) => {
                debug!(attempt, error = %e, "Retrying conflicting write");
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct IdRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct VersionRow {
    version: u64,
}
