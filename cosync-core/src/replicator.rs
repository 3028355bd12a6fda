//! Applies structural operations to a [`CatalogStore`].
//!
//! Remote operations originated by the local identity are echoes of edits
//! already applied locally and are suppressed. A path that does not
//! resolve, or a store that refuses a change, drops the operation without
//! raising: the replica simply keeps its current shape.

use tracing::{debug, trace};

use crate::catalog::{AnnotationKind, CatalogStore, NewNode};
use crate::message::Operation;
use crate::path::{NodeKind, TypedPath};

/// What happened to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The operation came from the local identity.
    Suppressed,
    /// The target could not be resolved or the store refused the change.
    Dropped(String),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct Replicator {
    identity: String,
}

impl Replicator {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.identity = identity.into();
    }

    /// Apply an operation received from `sender`.
    pub fn apply<S>(&self, op: &Operation, sender: &str, store: &mut S) -> ApplyOutcome
    where
        S: CatalogStore + ?Sized,
    {
        if sender == self.identity {
            trace!(code = %op.code(), path = %op.path(), "suppressing self echo");
            return ApplyOutcome::Suppressed;
        }
        let outcome = self.apply_local(op, store);
        if let ApplyOutcome::Dropped(reason) = &outcome {
            debug!(code = %op.code(), %sender, path = %op.path(), %reason, "operation dropped");
        }
        outcome
    }

    /// Apply an operation originated by this client.
    pub fn apply_local<S>(&self, op: &Operation, store: &mut S) -> ApplyOutcome
    where
        S: CatalogStore + ?Sized,
    {
        match op {
            Operation::Insert { path, id, sort_key } => {
                insert_leaf(store, path, *id, *sort_key)
            }
            Operation::Rename { path, new_name }
            | Operation::RenameNote { path, new_name, .. } => {
                let Some(node) = store.resolve(path) else {
                    return missing(path);
                };
                if !store.rename(node, new_name) {
                    return ApplyOutcome::Dropped(format!("store refused rename to {new_name:?}"));
                }
                if store.is_open(node) {
                    store.reload_artifact(node);
                }
                ApplyOutcome::Applied
            }
            Operation::Delete { path } => {
                let outcome = delete_leaf(store, path);
                let is_keyword = path.leaf().is_some_and(|s| s.kind == NodeKind::Keyword);
                if outcome.is_applied() && is_keyword {
                    store.refresh_annotations(AnnotationKind::Keywords);
                }
                outcome
            }
            Operation::Move { path, destination } => {
                let Some(node) = store.resolve(path) else {
                    return missing(path);
                };
                let Some(target) = store.resolve(destination) else {
                    return missing(destination);
                };
                if !store.move_node(node, target) {
                    return ApplyOutcome::Dropped(format!("store refused move under {destination}"));
                }
                ApplyOutcome::Applied
            }
            Operation::AttachNote { path, id, .. } => {
                let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
                    return ApplyOutcome::Dropped("note path has no parent".into());
                };
                let Some(parent) = store.resolve_or_create(&parent) else {
                    return missing(path);
                };
                match store.attach_note(parent, &leaf.name, *id) {
                    Some(_) => ApplyOutcome::Applied,
                    None => ApplyOutcome::Dropped("store refused note".into()),
                }
            }
            Operation::DeleteNote { path, .. } => {
                let outcome = delete_leaf(store, path);
                if outcome.is_applied() {
                    store.refresh_annotations(AnnotationKind::Notes);
                }
                outcome
            }
        }
    }
}

fn missing(path: &TypedPath) -> ApplyOutcome {
    ApplyOutcome::Dropped(format!("{path} not found"))
}

fn insert_leaf<S>(store: &mut S, path: &TypedPath, id: i64, sort_key: Option<i64>) -> ApplyOutcome
where
    S: CatalogStore + ?Sized,
{
    let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
        return ApplyOutcome::Dropped("cannot insert a root".into());
    };
    let Some(parent) = store.resolve_or_create(&parent) else {
        return missing(path);
    };
    let node = NewNode {
        name: leaf.name.clone(),
        kind: leaf.kind,
        id,
        sort_key,
    };
    match store.insert(parent, node) {
        Some(_) => ApplyOutcome::Applied,
        None => ApplyOutcome::Dropped("store refused insert".into()),
    }
}

fn delete_leaf<S>(store: &mut S, path: &TypedPath) -> ApplyOutcome
where
    S: CatalogStore + ?Sized,
{
    let Some(node) = store.resolve(path) else {
        return missing(path);
    };
    if store.delete(node) {
        ApplyOutcome::Applied
    } else {
        ApplyOutcome::Dropped("store refused delete".into())
    }
}

// ── Tests ────────────────────────────────────────────────────────
