//! Property tests for frame reassembly and replica reversibility.

use bytes::BytesMut;
use cosync_core::{
    ApplyOutcome, FrameCodec, NodeKind, Operation, ReplicaTree, Replicator, TypedPath,
};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

// ── Strategies ───────────────────────────────────────────────────

fn word_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9éü中]{1,6}"
}

/// One frame's text: `<code> <sender> <words...>`.
fn frame_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["A", "M", "V", "S", "AC", "NAQ"]),
        "[a-z][a-z0-9]{0,4}",
        prop::collection::vec(word_strategy(), 0..5),
    )
        .prop_map(|(code, sender, words)| {
            let mut text = format!("{code} {sender}");
            for word in words {
                text.push(' ');
                text.push_str(&word);
            }
            text
        })
}

fn collection_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec!["A", "B", "C"]).prop_map(String::from),
        1..4,
    )
}

// ── Helpers ──────────────────────────────────────────────────────

/// Feed `wire` to a fresh codec split at `cuts`, collecting raw frame text.
fn decode_in_chunks(wire: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&wire.len())) {
        buf.extend_from_slice(&wire[start..cut]);
        start = cut;
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame.raw().to_string());
        }
    }
    frames
}

fn typed(kind: NodeKind, names: &[String]) -> TypedPath {
    kind.grammar().unwrap().interpret(names).unwrap()
}

fn collection_path(chain: &[String]) -> Vec<String> {
    std::iter::once("Collections".to_string())
        .chain(chain.iter().cloned())
        .collect()
}

fn seed(replicator: &Replicator, tree: &mut ReplicaTree, chains: &[Vec<String>]) {
    for (i, chain) in chains.iter().enumerate() {
        let op = Operation::Insert {
            path: typed(NodeKind::Collection, &collection_path(chain)),
            id: i as i64 + 1,
            sort_key: None,
        };
        replicator.apply(&op, "seed", tree);
    }
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    /// However the byte stream is cut, the same frames come out in the same
    /// order, including multi-byte characters split across reads.
    #[test]
    fn chunk_boundaries_do_not_change_frames(
        frames in prop::collection::vec(frame_strategy(), 1..8),
        raw_cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let wire: String = frames.iter().map(|f| format!("{f} ||| ")).collect();
        let bytes = wire.as_bytes();

        let mut cuts: Vec<usize> = raw_cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        cuts.sort_unstable();

        prop_assert_eq!(decode_in_chunks(bytes, &[]), frames.clone());
        prop_assert_eq!(decode_in_chunks(bytes, &cuts), frames);
    }

    /// An insert followed by a delete of the same path leaves the tree as
    /// it was, implicit ancestors included.
    #[test]
    fn insert_then_delete_restores_tree(
        seeds in prop::collection::vec(collection_names(), 0..5),
        chain in collection_names(),
        leaf in "[a-z]{1,4}",
    ) {
        let replicator = Replicator::new("me");
        let mut tree = ReplicaTree::new();
        seed(&replicator, &mut tree, &seeds);
        let before = tree.snapshot();

        let mut names = collection_path(&chain);
        names.push(leaf);
        let path = typed(NodeKind::Clip, &names);

        let insert = Operation::Insert { path: path.clone(), id: 99, sort_key: Some(1) };
        prop_assert_eq!(replicator.apply(&insert, "other", &mut tree), ApplyOutcome::Applied);
        let delete = Operation::Delete { path };
        prop_assert_eq!(replicator.apply(&delete, "other", &mut tree), ApplyOutcome::Applied);

        prop_assert_eq!(tree.snapshot(), before);
    }

    /// Renaming a node and renaming it back is a no-op.
    #[test]
    fn rename_and_back_restores_tree(
        seeds in prop::collection::vec(collection_names(), 1..5),
        pick in any::<prop::sample::Index>(),
    ) {
        let replicator = Replicator::new("me");
        let mut tree = ReplicaTree::new();
        seed(&replicator, &mut tree, &seeds);
        let before = tree.snapshot();

        let chain = &seeds[pick.index(seeds.len())];
        let path = typed(NodeKind::Collection, &collection_path(chain));
        let renamed = path.with_leaf_name("renamed");

        let forward = Operation::Rename { path, new_name: "renamed".into() };
        prop_assert_eq!(replicator.apply(&forward, "other", &mut tree), ApplyOutcome::Applied);
        prop_assert_ne!(tree.snapshot(), before.clone());

        let original = chain[chain.len() - 1].clone();
        let back = Operation::Rename { path: renamed, new_name: original };
        prop_assert_eq!(replicator.apply(&back, "other", &mut tree), ApplyOutcome::Applied);
        prop_assert_eq!(tree.snapshot(), before);
    }

    /// Operations from the local identity never touch the replica.
    #[test]
    fn own_operations_are_suppressed(
        seeds in prop::collection::vec(collection_names(), 0..5),
        chain in collection_names(),
    ) {
        let replicator = Replicator::new("me");
        let mut tree = ReplicaTree::new();
        seed(&replicator, &mut tree, &seeds);
        let before = tree.snapshot();

        let path = typed(NodeKind::Collection, &collection_path(&chain));
        let ops = [
            Operation::Insert { path: path.clone(), id: 5, sort_key: None },
            Operation::Rename { path: path.clone(), new_name: "x".into() },
            Operation::Delete { path },
        ];
        for op in &ops {
            prop_assert_eq!(replicator.apply(op, "me", &mut tree), ApplyOutcome::Suppressed);
        }
        prop_assert_eq!(tree.snapshot(), before);
    }
}
