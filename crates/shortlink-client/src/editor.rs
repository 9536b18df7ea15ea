//! Permission-matrix editor.
//!
//! Toggles change a local draft only; nothing goes over the wire until
//! [`PermissionEditor::save`] sends the whole draft as one bulk request.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use shortlink_core::authz::{RbacSnapshot, effective_mask};
use shortlink_core::error::{ShortlinkError, ShortlinkResult};
use shortlink_core::hierarchy::RoleTree;
use shortlink_core::matrix::PermissionMatrix;
use shortlink_core::models::permission::SetPermission;
use shortlink_core::models::resource::Resource;
use shortlink_core::models::role::Role;
use shortlink_core::models::scope::{Operation, Scopes};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::RbacApi;

struct EditorState {
    roles: RoleTree,
    resources: Vec<Resource>,
    committed: PermissionMatrix,
    draft: PermissionMatrix,
    /// Bumped on every draft edit, so a save can tell whether the user
    /// kept editing while it was in flight.
    revision: u64,
}

impl EditorState {
    fn from_snapshot(snapshot: RbacSnapshot) -> Self {
        let (mut resources, roles, committed) = snapshot.into_parts();
        resources.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            roles,
            resources,
            draft: committed.clone(),
            committed,
            revision: 0,
        }
    }
}

/// Clears the saving flag when a save finishes or is dropped.
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PermissionEditor {
    api: RbacApi,
    state: Mutex<EditorState>,
    saving: AtomicBool,
}

impl PermissionEditor {
    /// Fetch roles, resources and the stored matrix.
    pub async fn load(api: RbacApi) -> ShortlinkResult<Self> {
        let snapshot = api.load_snapshot().await?;
        Ok(Self {
            api,
            state: Mutex::new(EditorState::from_snapshot(snapshot)),
            saving: AtomicBool::new(false),
        })
    }

    /// Re-fetch everything, dropping unsaved edits.
    pub async fn reload(&self) -> ShortlinkResult<()> {
        let snapshot = self.api.load_snapshot().await?;
        *self.state.lock() = EditorState::from_snapshot(snapshot);
        Ok(())
    }

    /// Roles in hierarchy order.
    pub fn roles(&self) -> Vec<Role> {
        self.state.lock().roles.list().into_iter().cloned().collect()
    }

    /// Resources ordered by key.
    pub fn resources(&self) -> Vec<Resource> {
        self.state.lock().resources.clone()
    }

    /// Flip one operation for the pair in the draft and return the pair's
    /// new scopes.
    pub fn toggle(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        operation: Operation,
    ) -> ShortlinkResult<Scopes> {
        let mut state = self.state.lock();
        if !state.roles.contains(role_id) {
            return Err(ShortlinkError::not_found("role", role_id));
        }
        if !state.resources.iter().any(|r| r.id == resource_id) {
            return Err(ShortlinkError::not_found("resource", resource_id));
        }
        let row = state.draft.toggle(role_id, resource_id, operation.scope());
        state.revision += 1;
        Ok(row.scopes)
    }

    /// Scopes held directly by the pair in the draft.
    pub fn scopes(&self, role_id: Uuid, resource_id: Uuid) -> Scopes {
        self.state.lock().draft.get(role_id, resource_id)
    }

    /// Draft scopes including everything inherited from ancestors.
    pub fn effective_scopes(&self, role_id: Uuid, resource_id: Uuid) -> Scopes {
        let state = self.state.lock();
        match state.roles.lineage(role_id) {
            Ok(chain) => effective_mask(
                chain
                    .into_iter()
                    .map(|role| state.draft.get(role.id, resource_id)),
            ),
            Err(_) => Scopes::empty(),
        }
    }

    /// Number of effective scopes (the "n/4" cell label).
    pub fn effective_count(&self, role_id: Uuid, resource_id: Uuid) -> u32 {
        self.effective_scopes(role_id, resource_id).count_set()
    }

    pub fn is_dirty(&self) -> bool {
        let state = self.state.lock();
        !state.draft.grants_equal(&state.committed)
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Throw away unsaved edits.
    pub fn discard(&self) {
        let mut state = self.state.lock();
        state.draft = state.committed.clone();
        state.revision += 1;
    }

    /// Send the draft as the new matrix.
    ///
    /// Fails with `SaveInProgress` while another save is outstanding. On
    /// any other failure the draft is rolled back to the last committed
    /// matrix and the error is returned.
    pub async fn save(&self) -> ShortlinkResult<()> {
        if self.saving.swap(true, Ordering::AcqRel) {
            return Err(ShortlinkError::SaveInProgress);
        }
        let _guard = SavingGuard(&self.saving);

        let (entries, revision) = {
            let state = self.state.lock();
            let entries: Vec<SetPermission> = state
                .draft
                .snapshot()
                .iter()
                .map(SetPermission::from)
                .collect();
            (entries, state.revision)
        };

        match self.api.save_permissions(&entries).await {
            Ok(saved) => {
                let committed = PermissionMatrix::from_permissions(saved)?;
                let mut state = self.state.lock();
                if state.revision == revision {
                    state.draft = committed.clone();
                }
                info!(rows = committed.len(), "Permission matrix saved");
                state.committed = committed;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Saving permission matrix failed, reverting edits");
                let mut state = self.state.lock();
                state.draft = state.committed.clone();
                state.revision += 1;
                Err(e)
            }
        }
    }
}
