//! In-memory replica of the shared catalog.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{AnnotationKind, CatalogStore, NewNode, NodeRef};
use crate::path::{NodeKind, NodeList, TypedPath};

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    id: i64,
    sort_key: Option<i64>,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    /// Created implicitly during path descent rather than by an insert.
    placeholder: bool,
}

/// Externally visible view of one replica node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub path: NodeList,
    pub kind: NodeKind,
    pub id: i64,
    pub parent_id: Option<i64>,
    pub sort_key: Option<i64>,
}

/// Requests the replica raised towards the collaborator surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreNotice {
    /// An open artifact was renamed and must reload.
    Reload(NodeList),
    /// Cached note or keyword lists are stale.
    Refresh(AnnotationKind),
}

/// Arena-backed catalog tree.
///
/// Children are matched by `(kind, name)`, so a collection and a clip may
/// share a name under the same parent. Implicitly created ancestors are
/// placeholders: an insert for the same node upgrades them, and they are
/// pruned once their last child is gone.
#[derive(Debug, Default)]
pub struct ReplicaTree {
    nodes: HashMap<NodeRef, Node>,
    roots: Vec<NodeRef>,
    next_ref: u64,
    open: HashSet<NodeRef>,
    notices: Vec<StoreNotice>,
}

impl ReplicaTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, placeholders included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// View a single node.
    pub fn get(&self, node: NodeRef) -> Option<NodeInfo> {
        let n = self.nodes.get(&node)?;
        Some(NodeInfo {
            path: self.path_of(node),
            kind: n.kind,
            id: n.id,
            parent_id: n.parent.and_then(|p| self.nodes.get(&p)).map(|p| p.id),
            sort_key: n.sort_key,
        })
    }

    /// Every node, ordered by path.
    pub fn snapshot(&self) -> Vec<NodeInfo> {
        let mut all: Vec<NodeInfo> = self.nodes.keys().filter_map(|r| self.get(*r)).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
        all
    }

    /// Mark `node` as open in the collaborator surface.
    pub fn open(&mut self, node: NodeRef) {
        if self.nodes.contains_key(&node) {
            self.open.insert(node);
        }
    }

    pub fn close(&mut self, node: NodeRef) {
        self.open.remove(&node);
    }

    /// Take every notice raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<StoreNotice> {
        std::mem::take(&mut self.notices)
    }

    // ── Internal ─────────────────────────────────────────────────

    fn path_of(&self, node: NodeRef) -> NodeList {
        let mut names = Vec::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let Some(n) = self.nodes.get(&current) else {
                break;
            };
            names.push(n.name.clone());
            cursor = n.parent;
        }
        names.reverse();
        NodeList::new(names)
    }

    fn siblings(&self, parent: Option<NodeRef>) -> &[NodeRef] {
        match parent {
            Some(p) => self
                .nodes
                .get(&p)
                .map(|n| n.children.as_slice())
                .unwrap_or(&[]),
            None => &self.roots,
        }
    }

    fn find_child(&self, parent: Option<NodeRef>, kind: NodeKind, name: &str) -> Option<NodeRef> {
        self.siblings(parent).iter().copied().find(|r| {
            self.nodes
                .get(r)
                .is_some_and(|n| n.kind == kind && n.name == name)
        })
    }

    fn alloc(&mut self, node: Node) -> NodeRef {
        self.next_ref += 1;
        let handle = NodeRef(self.next_ref);
        match node.parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.push(handle);
                }
            }
            None => self.roots.push(handle),
        }
        self.nodes.insert(handle, node);
        handle
    }

    fn detach(&mut self, node: NodeRef) -> Option<NodeRef> {
        let parent = self.nodes.get(&node)?.parent;
        match parent {
            Some(p) => {
                if let Some(pn) = self.nodes.get_mut(&p) {
                    pn.children.retain(|c| *c != node);
                }
            }
            None => self.roots.retain(|r| *r != node),
        }
        parent
    }

    fn remove_subtree(&mut self, node: NodeRef) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.remove(&current) {
                stack.extend(n.children);
            }
            self.open.remove(&current);
        }
    }

    fn prune_placeholders(&mut self, mut cursor: Option<NodeRef>) {
        while let Some(current) = cursor {
            let Some(n) = self.nodes.get(&current) else {
                return;
            };
            if !n.placeholder || !n.children.is_empty() {
                return;
            }
            cursor = self.detach(current);
            self.nodes.remove(&current);
        }
    }

    fn is_within(&self, node: NodeRef, ancestor: NodeRef) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        false
    }
}

impl CatalogStore for ReplicaTree {
    fn resolve(&self, path: &TypedPath) -> Option<NodeRef> {
        let mut parent = None;
        for segment in path.segments() {
            parent = Some(self.find_child(parent, segment.kind, &segment.name)?);
        }
        parent
    }

    fn resolve_or_create(&mut self, path: &TypedPath) -> Option<NodeRef> {
        let mut parent = None;
        for segment in path.segments() {
            let next = match self.find_child(parent, segment.kind, &segment.name) {
                Some(existing) => existing,
                None => self.alloc(Node {
                    name: segment.name.clone(),
                    kind: segment.kind,
                    id: 0,
                    sort_key: None,
                    parent,
                    children: Vec::new(),
                    placeholder: true,
                }),
            };
            parent = Some(next);
        }
        parent
    }

    fn insert(&mut self, parent: NodeRef, node: NewNode) -> Option<NodeRef> {
        if !self.nodes.contains_key(&parent) || node.name.is_empty() {
            return None;
        }
        if let Some(existing) = self.find_child(Some(parent), node.kind, &node.name) {
            let n = self.nodes.get_mut(&existing)?;
            n.id = node.id;
            n.sort_key = node.sort_key;
            n.placeholder = false;
            return Some(existing);
        }
        Some(self.alloc(Node {
            name: node.name,
            kind: node.kind,
            id: node.id,
            sort_key: node.sort_key,
            parent: Some(parent),
            children: Vec::new(),
            placeholder: false,
        }))
    }

    fn rename(&mut self, node: NodeRef, new_name: &str) -> bool {
        let Some(n) = self.nodes.get(&node) else {
            return false;
        };
        if new_name.is_empty() {
            return false;
        }
        if n.name == new_name {
            return true;
        }
        let (kind, parent) = (n.kind, n.parent);
        if self.find_child(parent, kind, new_name).is_some() {
            return false;
        }
        match self.nodes.get_mut(&node) {
            Some(n) => {
                n.name = new_name.to_string();
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, node: NodeRef) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        let parent = self.detach(node);
        self.remove_subtree(node);
        self.prune_placeholders(parent);
        true
    }

    fn move_node(&mut self, node: NodeRef, new_parent: NodeRef) -> bool {
        let Some(n) = self.nodes.get(&node) else {
            return false;
        };
        if !self.nodes.contains_key(&new_parent) || self.is_within(new_parent, node) {
            return false;
        }
        if n.parent == Some(new_parent) {
            return true;
        }
        let (kind, name) = (n.kind, n.name.clone());
        if self.find_child(Some(new_parent), kind, &name).is_some() {
            return false;
        }

        let old_parent = self.detach(node);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(new_parent);
        }
        if let Some(p) = self.nodes.get_mut(&new_parent) {
            p.children.push(node);
        }
        self.prune_placeholders(old_parent);
        true
    }

    fn is_open(&self, node: NodeRef) -> bool {
        self.open.contains(&node)
    }

    fn reload_artifact(&mut self, node: NodeRef) {
        let path = self.path_of(node);
        self.notices.push(StoreNotice::Reload(path));
    }

    fn refresh_annotations(&mut self, kind: AnnotationKind) {
        self.notices.push(StoreNotice::Refresh(kind));
    }

    fn take_notices(&mut self) -> Vec<StoreNotice> {
        self.drain_notices()
    }
}

// ── Tests ────────────────────────────────────────────────────────
