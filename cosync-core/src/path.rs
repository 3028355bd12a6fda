//! Catalog node kinds, node lists, and the path grammar that types them.
//!
//! A structural message names its target with a flat [`NodeList`]. Which
//! positions are collection ancestors, which is the typed parent and which
//! is the leaf depends on the kind of node being addressed; each kind
//! declares that shape as a [`Grammar`] and [`Grammar::interpret`] turns a
//! node list into a [`TypedPath`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Separator between node names inside a structural payload.
pub const PATH_DELIMITER: &str = ">|<";

/// What the encoder places between node names.
pub const PATH_JOINER: &str = " >|< ";

// ── NodeKind ─────────────────────────────────────────────────────

/// Type tag of a catalog node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    /// One of the fixed top-level catalog roots.
    Root,
    Library,
    Document,
    Episode,
    Transcript,
    Collection,
    Quote,
    Clip,
    Snapshot,
    KeywordGroup,
    Keyword,
    Note,
}

impl NodeKind {
    /// Wire tag used by kind-tagged messages (rename, delete, move).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Library => "Library",
            Self::Document => "Document",
            Self::Episode => "Episode",
            Self::Transcript => "Transcript",
            Self::Collection => "Collection",
            Self::Quote => "Quote",
            Self::Clip => "Clip",
            Self::Snapshot => "Snapshot",
            Self::KeywordGroup => "KeywordGroup",
            Self::Keyword => "Keyword",
            Self::Note => "Note",
        }
    }

    /// Name of the catalog root this kind lives under.
    pub fn root_name(&self) -> Option<&'static str> {
        match self {
            Self::Library | Self::Document | Self::Episode | Self::Transcript => {
                Some(LIBRARIES_ROOT)
            }
            Self::Collection | Self::Quote | Self::Clip | Self::Snapshot => {
                Some(COLLECTIONS_ROOT)
            }
            Self::KeywordGroup | Self::Keyword => Some(KEYWORDS_ROOT),
            Self::Root | Self::Note => None,
        }
    }

    /// The grammar for a node list whose leaf is of this kind.
    ///
    /// Notes and roots have no standalone grammar; notes are addressed
    /// through [`NoteParent::grammar`].
    pub fn grammar(&self) -> Result<Grammar, SyncError> {
        let Some(root) = self.root_name() else {
            return Err(SyncError::PathMismatch {
                kind: self.tag(),
                reason: "kind cannot be addressed directly".into(),
            });
        };
        let steps = match self {
            Self::Library | Self::KeywordGroup => vec![],
            Self::Document | Self::Episode => vec![Step::Fixed(Self::Library)],
            Self::Transcript => vec![Step::Fixed(Self::Library), Step::Fixed(Self::Episode)],
            Self::Collection => vec![Step::Collections { min: 0 }],
            Self::Quote | Self::Clip | Self::Snapshot => vec![Step::Collections { min: 1 }],
            Self::Keyword => vec![Step::Fixed(Self::KeywordGroup)],
            Self::Root | Self::Note => vec![],
        };
        Ok(Grammar {
            root,
            steps,
            leaf: *self,
        })
    }
}

impl TryFrom<&str> for NodeKind {
    type Error = SyncError;

    fn try_from(tag: &str) -> Result<Self, Self::Error> {
        match tag {
            "Library" => Ok(Self::Library),
            "Document" => Ok(Self::Document),
            "Episode" => Ok(Self::Episode),
            "Transcript" => Ok(Self::Transcript),
            "Collection" => Ok(Self::Collection),
            "Quote" => Ok(Self::Quote),
            "Clip" => Ok(Self::Clip),
            "Snapshot" => Ok(Self::Snapshot),
            "KeywordGroup" => Ok(Self::KeywordGroup),
            "Keyword" => Ok(Self::Keyword),
            "Note" => Ok(Self::Note),
            other => Err(SyncError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub const LIBRARIES_ROOT: &str = "Libraries";
pub const COLLECTIONS_ROOT: &str = "Collections";
pub const KEYWORDS_ROOT: &str = "Keywords";

// ── NoteParent ───────────────────────────────────────────────────

/// The kind of content node a note hangs off, encoded as a code suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteParent {
    Library,
    Document,
    Episode,
    Transcript,
    Collection,
    Quote,
    Clip,
    Snapshot,
}

impl NoteParent {
    pub const ALL: [NoteParent; 8] = [
        Self::Library,
        Self::Document,
        Self::Episode,
        Self::Transcript,
        Self::Collection,
        Self::Quote,
        Self::Clip,
        Self::Snapshot,
    ];

    /// Code suffix (`NA<suffix>`, `NR<suffix>`, `ND<suffix>`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Library => "L",
            Self::Document => "D",
            Self::Episode => "E",
            Self::Transcript => "T",
            Self::Collection => "C",
            Self::Quote => "Q",
            Self::Clip => "Cl",
            Self::Snapshot => "Sn",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.suffix() == suffix)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Library => NodeKind::Library,
            Self::Document => NodeKind::Document,
            Self::Episode => NodeKind::Episode,
            Self::Transcript => NodeKind::Transcript,
            Self::Collection => NodeKind::Collection,
            Self::Quote => NodeKind::Quote,
            Self::Clip => NodeKind::Clip,
            Self::Snapshot => NodeKind::Snapshot,
        }
    }

    /// Parent grammar with the parent itself turned into a fixed step and
    /// a note as the leaf.
    pub fn grammar(&self) -> Grammar {
        let kind = self.kind();
        let root = kind.root_name().unwrap_or(COLLECTIONS_ROOT);
        let mut steps = match kind.grammar() {
            Ok(parent) => parent.steps,
            Err(_) => Vec::new(),
        };
        steps.push(Step::Fixed(kind));
        Grammar {
            root,
            steps,
            leaf: NodeKind::Note,
        }
    }
}

// ── NodeList ─────────────────────────────────────────────────────

/// An ordered list of names as carried on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeList(Vec<String>);

impl NodeList {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Split a payload on [`PATH_DELIMITER`], trimming each element.
    pub fn parse(payload: &str) -> Self {
        if payload.trim().is_empty() {
            return Self::default();
        }
        Self(
            payload
                .split(PATH_DELIMITER)
                .map(|name| name.trim().to_string())
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    /// Join back into wire form.
    pub fn encode(&self) -> String {
        self.0.join(PATH_JOINER)
    }
}

impl<S: Into<String>> FromIterator<S> for NodeList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for NodeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" / "))
    }
}

// ── TypedPath ────────────────────────────────────────────────────

/// One `(kind, name)` step of a typed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub kind: NodeKind,
    pub name: String,
}

/// A node list with a kind attached to every position, starting at a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedPath(Vec<Segment>);

impl TypedPath {
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn leaf(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Everything but the leaf. `None` for a bare root.
    pub fn parent(&self) -> Option<TypedPath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// A copy with the leaf renamed.
    pub fn with_leaf_name(&self, name: &str) -> TypedPath {
        let mut segments = self.0.clone();
        if let Some(last) = segments.last_mut() {
            last.name = name.to_string();
        }
        Self(segments)
    }

    pub fn to_node_list(&self) -> NodeList {
        self.0.iter().map(|s| s.name.clone()).collect()
    }
}

impl fmt::Display for TypedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_node_list().fmt(f)
    }
}

// ── Grammar ──────────────────────────────────────────────────────

/// One ancestor position between the root and the leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Exactly one ancestor of this kind.
    Fixed(NodeKind),
    /// A run of nested collections, at least `min` deep.
    Collections { min: usize },
}

/// Declarative shape of a node list: root name, ancestor steps, leaf kind.
///
/// At most one step is a [`Step::Collections`] run; fixed steps before it
/// consume names from the front, fixed steps after it from the back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    pub root: &'static str,
    pub steps: Vec<Step>,
    pub leaf: NodeKind,
}

impl Grammar {
    /// Type every name in `names` (root first, leaf last).
    pub fn interpret(&self, names: &[String]) -> Result<TypedPath, SyncError> {
        let mismatch = |reason: String| SyncError::PathMismatch {
            kind: self.leaf.tag(),
            reason,
        };

        let Some((root, rest)) = names.split_first() else {
            return Err(mismatch("empty node list".into()));
        };
        if root != self.root {
            return Err(mismatch(format!("expected root {}, got {root}", self.root)));
        }
        let Some((leaf, middle)) = rest.split_last() else {
            return Err(mismatch("missing leaf".into()));
        };
        if let Some(blank) = names.iter().find(|n| n.is_empty()) {
            return Err(mismatch(format!("blank name {blank:?}")));
        }

        let run_at = self
            .steps
            .iter()
            .position(|s| matches!(s, Step::Collections { .. }));

        let mut segments = Vec::with_capacity(names.len());
        segments.push(Segment {
            kind: NodeKind::Root,
            name: root.clone(),
        });

        match run_at {
            None => {
                if middle.len() != self.steps.len() {
                    return Err(mismatch(format!(
                        "expected {} ancestors, got {}",
                        self.steps.len(),
                        middle.len()
                    )));
                }
                for (step, name) in self.steps.iter().zip(middle) {
                    segments.push(Segment {
                        kind: step_kind(step),
                        name: name.clone(),
                    });
                }
            }
            Some(at) => {
                let prefix = &self.steps[..at];
                let suffix = &self.steps[at + 1..];
                let min = match self.steps[at] {
                    Step::Collections { min } => min,
                    Step::Fixed(_) => 0,
                };
                let fixed = prefix.len() + suffix.len();
                if middle.len() < fixed + min {
                    return Err(mismatch(format!(
                        "expected at least {} ancestors, got {}",
                        fixed + min,
                        middle.len()
                    )));
                }
                let run_len = middle.len() - fixed;
                let (head, tail) = middle.split_at(prefix.len());
                let (run, back) = tail.split_at(run_len);

                for (step, name) in prefix.iter().zip(head) {
                    segments.push(Segment {
                        kind: step_kind(step),
                        name: name.clone(),
                    });
                }
                for name in run {
                    segments.push(Segment {
                        kind: NodeKind::Collection,
                        name: name.clone(),
                    });
                }
                for (step, name) in suffix.iter().zip(back) {
                    segments.push(Segment {
                        kind: step_kind(step),
                        name: name.clone(),
                    });
                }
            }
        }

        segments.push(Segment {
            kind: self.leaf,
            name: leaf.clone(),
        });
        Ok(TypedPath(segments))
    }
}

fn step_kind(step: &Step) -> NodeKind {
    match step {
        Step::Fixed(kind) => *kind,
        Step::Collections { .. } => NodeKind::Collection,
    }
}

/// Build a typed path for a root-only target (used for destination parents
/// that are the bare `Collections` root).
pub fn root_path(name: &str) -> TypedPath {
    TypedPath(vec![Segment {
        kind: NodeKind::Root,
        name: name.to_string(),
    }])
}

/// Type a list of nested collections under `Collections`, root included.
pub fn collection_chain(names: &[String]) -> Result<TypedPath, SyncError> {
    match names {
        [root] if root == COLLECTIONS_ROOT => Ok(root_path(root)),
        _ => NodeKind::Collection.grammar()?.interpret(names),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn kinds(path: &TypedPath) -> Vec<NodeKind> {
        path.segments().iter().map(|s| s.kind).collect()
    }

    #[test]
    fn node_list_parse_trims_elements() {
        let list = NodeList::parse("42 >|< Collections >|<Root>|< Child ");
        assert_eq!(list.names(), &names(&["42", "Collections", "Root", "Child"])[..]);
        assert_eq!(list.encode(), "42 >|< Collections >|< Root >|< Child");
        assert!(NodeList::parse("  ").is_empty());
    }

    #[test]
    fn nested_collection() {
        let path = NodeKind::Collection
            .grammar()
            .unwrap()
            .interpret(&names(&["Collections", "Root", "Child"]))
            .unwrap();
        assert_eq!(
            kinds(&path),
            vec![NodeKind::Root, NodeKind::Collection, NodeKind::Collection]
        );
    }

    #[test]
    fn transcript_needs_exact_ancestors() {
        let grammar = NodeKind::Transcript.grammar().unwrap();
        let path = grammar
            .interpret(&names(&["Libraries", "Lib", "Ep", "T1"]))
            .unwrap();
        assert_eq!(
            kinds(&path),
            vec![
                NodeKind::Root,
                NodeKind::Library,
                NodeKind::Episode,
                NodeKind::Transcript
            ]
        );
        assert!(grammar.interpret(&names(&["Libraries", "Lib", "T1"])).is_err());
    }

    #[test]
    fn clip_requires_a_collection() {
        let grammar = NodeKind::Clip.grammar().unwrap();
        assert!(grammar.interpret(&names(&["Collections", "Clip1"])).is_err());
        assert!(grammar.interpret(&names(&["Collections", "A", "Clip1"])).is_ok());
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = NodeKind::Keyword
            .grammar()
            .unwrap()
            .interpret(&names(&["Collections", "Group", "kw"]))
            .unwrap_err();
        assert!(matches!(err, SyncError::PathMismatch { .. }));
    }

    #[test]
    fn quote_note_walks_collections_then_quote() {
        let path = NoteParent::Quote
            .grammar()
            .interpret(&names(&["Collections", "A", "B", "Q1", "memo"]))
            .unwrap();
        assert_eq!(
            kinds(&path),
            vec![
                NodeKind::Root,
                NodeKind::Collection,
                NodeKind::Collection,
                NodeKind::Quote,
                NodeKind::Note
            ]
        );
    }

    #[test]
    fn collection_note_treats_last_ancestor_as_parent() {
        let path = NoteParent::Collection
            .grammar()
            .interpret(&names(&["Collections", "A", "B", "memo"]))
            .unwrap();
        assert_eq!(
            kinds(&path),
            vec![
                NodeKind::Root,
                NodeKind::Collection,
                NodeKind::Collection,
                NodeKind::Note
            ]
        );
    }

    #[test]
    fn episode_note_shape() {
        let grammar = NoteParent::Episode.grammar();
        assert_eq!(grammar.root, LIBRARIES_ROOT);
        assert_eq!(
            grammar.steps,
            vec![Step::Fixed(NodeKind::Library), Step::Fixed(NodeKind::Episode)]
        );
    }

    #[test]
    fn note_parent_suffixes_are_unique() {
        for parent in NoteParent::ALL {
            assert_eq!(NoteParent::from_suffix(parent.suffix()), Some(parent));
        }
        assert_eq!(NoteParent::from_suffix("X"), None);
    }

    #[test]
    fn blank_names_are_rejected() {
        let grammar = NodeKind::Collection.grammar().unwrap();
        assert!(grammar.interpret(&names(&["Collections", "", "C"])).is_err());
    }

    #[test]
    fn kind_tags_round_trip() {
        assert_eq!(NodeKind::try_from("KeywordGroup").unwrap(), NodeKind::KeywordGroup);
        assert!(matches!(
            NodeKind::try_from("Widget"),
            Err(SyncError::UnknownKind(_))
        ));
        assert!(NodeKind::Note.grammar().is_err());
    }

    #[test]
    fn collection_chain_accepts_bare_root() {
        let root = collection_chain(&names(&["Collections"])).unwrap();
        assert_eq!(root.segments().len(), 1);
        let nested = collection_chain(&names(&["Collections", "A"])).unwrap();
        assert_eq!(nested.leaf().unwrap().kind, NodeKind::Collection);
    }
}
