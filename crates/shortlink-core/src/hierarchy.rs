//! Role hierarchy encoded as a nested set.
//!
//! The tree is an arena of roles addressed by id. Every structural
//! mutation keeps `lft`/`rgt` consistent with the parent pointers, so
//! ancestor and descendant checks are range comparisons:
//! B descends from A iff `A.lft < B.lft && B.rgt < A.rgt`.
//!
//! Mutations return the ids of pre-existing roles whose placement
//! (bounds or parent) changed, which is exactly the set of rows a store
//! has to rewrite.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{ShortlinkError, ShortlinkResult};
use crate::models::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    parent_id: Option<Uuid>,
    lft: i64,
    rgt: i64,
}

impl Placement {
    fn of(role: &Role) -> Self {
        Self {
            parent_id: role.parent_id,
            lft: role.lft,
            rgt: role.rgt,
        }
    }
}

enum Visit {
    Enter(Uuid),
    Exit(Uuid, i64),
}

/// Arena of roles with maintained nested-set bounds.
#[derive(Debug, Clone, Default)]
pub struct RoleTree {
    roles: HashMap<Uuid, Role>,
}

impl RoleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load stored rows. When the stored bounds disagree with the parent
    /// pointers they are recomputed from the pointers.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> ShortlinkResult<Self> {
        let mut tree = Self::new();
        for role in roles {
            let id = role.id;
            if tree.roles.insert(id, role).is_some() {
                return Err(ShortlinkError::Conflict {
                    message: format!("role {id} appears twice"),
                });
            }
        }
        if let Err(err) = tree.verify() {
            warn!(error = %err, roles = tree.len(), "Role bounds inconsistent, rebuilding");
            tree.rebuild()?;
        }
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.roles.contains_key(&id)
    }

    /// All roles in pre-order (ascending `lft`).
    pub fn list(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self.roles.values().collect();
        roles.sort_by_key(|role| role.lft);
        roles
    }

    pub fn into_roles(self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.into_values().collect();
        roles.sort_by_key(|role| role.lft);
        roles
    }

    fn require(&self, id: Uuid) -> ShortlinkResult<&Role> {
        self.roles
            .get(&id)
            .ok_or_else(|| ShortlinkError::not_found("role", id))
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors_of(&self, id: Uuid) -> ShortlinkResult<Vec<&Role>> {
        let role = self.require(id)?;
        let mut ancestors: Vec<&Role> = self
            .roles
            .values()
            .filter(|other| other.lft < role.lft && role.rgt < other.rgt)
            .collect();
        ancestors.sort_by_key(|other| Reverse(other.lft));
        Ok(ancestors)
    }

    /// The role itself followed by its ancestors up to the root.
    pub fn lineage(&self, id: Uuid) -> ShortlinkResult<Vec<&Role>> {
        let mut chain = vec![self.require(id)?];
        chain.extend(self.ancestors_of(id)?);
        Ok(chain)
    }

    /// Strict descendants in pre-order.
    pub fn descendants_of(&self, id: Uuid) -> ShortlinkResult<Vec<&Role>> {
        let role = self.require(id)?;
        let mut descendants: Vec<&Role> = self
            .roles
            .values()
            .filter(|other| role.lft < other.lft && other.rgt < role.rgt)
            .collect();
        descendants.sort_by_key(|other| other.lft);
        Ok(descendants)
    }

    /// `false` when either role is unknown.
    pub fn is_descendant(&self, candidate: Uuid, ancestor: Uuid) -> bool {
        match (self.roles.get(&candidate), self.roles.get(&ancestor)) {
            (Some(c), Some(a)) => a.lft < c.lft && c.rgt < a.rgt,
            _ => false,
        }
    }

    /// Reject a parent that is the role itself, one of its descendants,
    /// or unknown.
    pub fn check_parent(&self, role_id: Uuid, parent_id: Uuid) -> ShortlinkResult<()> {
        if parent_id == role_id || self.is_descendant(parent_id, role_id) {
            return Err(ShortlinkError::CyclicParent { role_id, parent_id });
        }
        self.require(parent_id).map(|_| ())
    }

    /// Insert `role` as the last child of its parent (or as a new root).
    /// The bounds carried by `role` are ignored and assigned here.
    pub fn insert(&mut self, mut role: Role) -> ShortlinkResult<Vec<Uuid>> {
        if self.roles.contains_key(&role.id) {
            return Err(ShortlinkError::Conflict {
                message: format!("role {} already exists", role.id),
            });
        }
        let point = match role.parent_id {
            Some(parent_id) => {
                self.check_parent(role.id, parent_id)?;
                self.require(parent_id)?.rgt
            }
            None => self.next_root_lft(None),
        };

        let before = self.placements();
        for other in self.roles.values_mut() {
            if other.lft >= point {
                other.lft += 2;
            }
            if other.rgt >= point {
                other.rgt += 2;
            }
        }
        role.lft = point;
        role.rgt = point + 1;
        self.roles.insert(role.id, role);
        Ok(self.changed_since(&before))
    }

    /// Remove a role. Its children are re-pointed to its parent (or become
    /// roots) and the freed range is compacted.
    pub fn remove(&mut self, id: Uuid) -> ShortlinkResult<(Role, Vec<Uuid>)> {
        let removed = self
            .roles
            .remove(&id)
            .ok_or_else(|| ShortlinkError::not_found("role", id))?;
        let (l, r) = (removed.lft, removed.rgt);

        let before = self.placements();
        for other in self.roles.values_mut() {
            if other.parent_id == Some(id) {
                other.parent_id = removed.parent_id;
            }
            if l < other.lft && other.rgt < r {
                other.lft -= 1;
                other.rgt -= 1;
            } else {
                if other.lft > r {
                    other.lft -= 2;
                }
                if other.rgt > r {
                    other.rgt -= 2;
                }
            }
        }
        Ok((removed, self.changed_since(&before)))
    }

    /// Move a role and its whole subtree under `parent_id` (or to the top
    /// level when `None`).
    pub fn reparent(&mut self, id: Uuid, parent_id: Option<Uuid>) -> ShortlinkResult<Vec<Uuid>> {
        let role = self.require(id)?;
        if role.parent_id == parent_id {
            return Ok(Vec::new());
        }
        let (l, r) = (role.lft, role.rgt);
        if let Some(parent_id) = parent_id {
            self.check_parent(id, parent_id)?;
        }
        let width = r - l + 1;
        let before = self.placements();

        let subtree: HashSet<Uuid> = self
            .roles
            .values()
            .filter(|other| l <= other.lft && other.rgt <= r)
            .map(|other| other.id)
            .collect();

        // Detach: the subtree keeps only relative offsets, the gap closes.
        for other in self.roles.values_mut() {
            if subtree.contains(&other.id) {
                other.lft -= l;
                other.rgt -= l;
            } else {
                if other.lft > r {
                    other.lft -= width;
                }
                if other.rgt > r {
                    other.rgt -= width;
                }
            }
        }

        let point = match parent_id {
            Some(parent_id) => self.require(parent_id)?.rgt,
            None => self.next_root_lft(Some(&subtree)),
        };

        // Reinsert: open a gap of `width` at the insertion point.
        for other in self.roles.values_mut() {
            if subtree.contains(&other.id) {
                other.lft += point;
                other.rgt += point;
            } else {
                if other.lft >= point {
                    other.lft += width;
                }
                if other.rgt >= point {
                    other.rgt += width;
                }
            }
        }
        if let Some(moved) = self.roles.get_mut(&id) {
            moved.parent_id = parent_id;
        }
        Ok(self.changed_since(&before))
    }

    /// Recompute every bound from the parent pointers with a depth-first
    /// walk. Siblings are ordered by creation time, then id.
    pub fn rebuild(&mut self) -> ShortlinkResult<Vec<Uuid>> {
        let mut children: HashMap<Option<Uuid>, Vec<(DateTime<Utc>, Uuid)>> = HashMap::new();
        for role in self.roles.values() {
            if let Some(parent_id) = role.parent_id
                && !self.roles.contains_key(&parent_id)
            {
                return Err(ShortlinkError::validation(format!(
                    "role {} references missing parent {parent_id}",
                    role.id
                )));
            }
            children
                .entry(role.parent_id)
                .or_default()
                .push((role.created_at, role.id));
        }
        for siblings in children.values_mut() {
            siblings.sort();
        }

        let mut stack: Vec<Visit> = children
            .get(&None)
            .map(|roots| roots.iter().rev().map(|&(_, id)| Visit::Enter(id)).collect())
            .unwrap_or_default();
        let mut bounds: HashMap<Uuid, (i64, i64)> = HashMap::with_capacity(self.roles.len());
        let mut counter = 1;
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    stack.push(Visit::Exit(id, counter));
                    counter += 1;
                    if let Some(kids) = children.get(&Some(id)) {
                        stack.extend(kids.iter().rev().map(|&(_, child)| Visit::Enter(child)));
                    }
                }
                Visit::Exit(id, lft) => {
                    bounds.insert(id, (lft, counter));
                    counter += 1;
                }
            }
        }
        if bounds.len() != self.roles.len() {
            return Err(ShortlinkError::validation(
                "role hierarchy contains a cycle",
            ));
        }

        let before = self.placements();
        for (id, (lft, rgt)) in bounds {
            if let Some(role) = self.roles.get_mut(&id) {
                role.lft = lft;
                role.rgt = rgt;
            }
        }
        Ok(self.changed_since(&before))
    }

    /// Check that the bounds form a proper nested set and agree with the
    /// parent pointers.
    pub fn verify(&self) -> ShortlinkResult<()> {
        let mut bounds = HashSet::with_capacity(self.roles.len() * 2);
        for role in self.roles.values() {
            if role.lft >= role.rgt {
                return Err(ShortlinkError::validation(format!(
                    "role {} has lft {} >= rgt {}",
                    role.id, role.lft, role.rgt
                )));
            }
            if !bounds.insert(role.lft) || !bounds.insert(role.rgt) {
                return Err(ShortlinkError::validation(format!(
                    "role {} shares a bound with another role",
                    role.id
                )));
            }
        }

        let mut open: Vec<&Role> = Vec::new();
        for role in self.list() {
            while open.last().is_some_and(|top| top.rgt < role.lft) {
                open.pop();
            }
            let enclosing = open.last().copied();
            if let Some(top) = enclosing
                && role.rgt > top.rgt
            {
                return Err(ShortlinkError::validation(format!(
                    "role {} overlaps role {}",
                    role.id, top.id
                )));
            }
            if enclosing.map(|top| top.id) != role.parent_id {
                return Err(ShortlinkError::validation(format!(
                    "role {} bounds disagree with its parent",
                    role.id
                )));
            }
            open.push(role);
        }
        Ok(())
    }

    fn next_root_lft(&self, skip: Option<&HashSet<Uuid>>) -> i64 {
        self.roles
            .values()
            .filter(|role| skip.is_none_or(|skip| !skip.contains(&role.id)))
            .map(|role| role.rgt)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn placements(&self) -> HashMap<Uuid, Placement> {
        self.roles
            .values()
            .map(|role| (role.id, Placement::of(role)))
            .collect()
    }

    fn changed_since(&self, before: &HashMap<Uuid, Placement>) -> Vec<Uuid> {
        let mut changed: Vec<Uuid> = self
            .roles
            .values()
            .filter(|role| {
                before
                    .get(&role.id)
                    .is_some_and(|placement| *placement != Placement::of(role))
            })
            .map(|role| role.id)
            .collect();
        changed.sort();
        changed
    }
}
