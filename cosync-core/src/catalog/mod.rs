//! The catalog store seam and the in-memory replica tree.
//!
//! The replicator never touches tree internals; it drives any
//! [`CatalogStore`]. Every operation reports success or failure through its
//! return value and never errors on "not found", so callers can treat a
//! miss as a silent drop.

mod tree;

pub use tree::{NodeInfo, ReplicaTree, StoreNotice};

use crate::path::{NodeKind, TypedPath};

/// Opaque handle to a node inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u64);

/// A node to be created under an existing parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub name: String,
    pub kind: NodeKind,
    pub id: i64,
    pub sort_key: Option<i64>,
}

/// Which cached annotation list an open artifact should reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Notes,
    Keywords,
}

/// Narrow interface onto the application's catalog.
pub trait CatalogStore {
    /// Look up the node at `path`.
    fn resolve(&self, path: &TypedPath) -> Option<NodeRef>;

    /// Look up the node at `path`, creating any missing nodes on the way.
    fn resolve_or_create(&mut self, path: &TypedPath) -> Option<NodeRef>;

    /// Create (or refresh) a child of `parent`.
    fn insert(&mut self, parent: NodeRef, node: NewNode) -> Option<NodeRef>;

    /// Give `node` a new terminal name.
    fn rename(&mut self, node: NodeRef, new_name: &str) -> bool;

    /// Remove `node` together with everything beneath it.
    fn delete(&mut self, node: NodeRef) -> bool;

    /// Re-parent `node` under `new_parent`.
    fn move_node(&mut self, node: NodeRef, new_parent: NodeRef) -> bool;

    /// Attach a note named `name` with record id `note_id` to `parent`.
    fn attach_note(&mut self, parent: NodeRef, name: &str, note_id: i64) -> Option<NodeRef> {
        self.insert(
            parent,
            NewNode {
                name: name.to_string(),
                kind: NodeKind::Note,
                id: note_id,
                sort_key: None,
            },
        )
    }

    /// Whether `node` is currently open in the collaborator surface.
    fn is_open(&self, _node: NodeRef) -> bool {
        false
    }

    /// Ask the collaborator surface to reload an open artifact.
    fn reload_artifact(&mut self, _node: NodeRef) {}

    /// Ask open artifacts to drop cached note or keyword lists.
    fn refresh_annotations(&mut self, _kind: AnnotationKind) {}

    /// Hand over the reload and refresh requests raised since the last
    /// call. Stores that act on the hooks directly keep nothing.
    fn take_notices(&mut self) -> Vec<StoreNotice> {
        Vec::new()
    }
}
