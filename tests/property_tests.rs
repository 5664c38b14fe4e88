//! Property-based tests for core types, path algebra and reconciliation.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeSet;

use proptest::prelude::*;

use pyxis::core::paths;
use pyxis::core::types::{BranchName, Oid};
use pyxis::git::mock::MockStore;
use pyxis::git::VersionStore;
use pyxis::merge::reconcile;
use pyxis::notify::{ChangeKind, RecordingSink};
use pyxis::vfs::MemoryFs;

/// Strategy for generating valid branch name characters.
fn branch_name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
        Just('/'),
    ]
}

/// Strategy for generating valid branch names.
fn valid_branch_name() -> impl Strategy<Value = String> {
    prop::collection::vec(branch_name_char(), 1..50).prop_filter_map(
        "must be valid branch name",
        |chars| {
            let name: String = chars.into_iter().collect();
            let rejected = name.starts_with('-')
                || name.ends_with('/')
                || name.contains("..")
                || name.contains("//")
                || name
                    .split('/')
                    .any(|c| c.starts_with('.') || c.ends_with(".lock"));
            (!rejected).then_some(name)
        },
    )
}

/// Strategy for generating valid hex OIDs.
fn valid_oid_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
        ]),
        40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// Project-relative file paths that never collide with directory names.
fn tree_files() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop_oneof![
            (0..6u8).prop_map(|n| format!("f{n}.txt")),
            (0..3u8, 0..4u8).prop_map(|(d, n)| format!("dir{d}/f{n}.txt")),
        ],
        0..10,
    )
}

proptest! {
    /// Any valid branch name round-trips through serde.
    #[test]
    fn branch_name_serde_roundtrip(name in valid_branch_name()) {
        let branch = BranchName::new(&name).unwrap();
        let json = serde_json::to_string(&branch).unwrap();
        let parsed: BranchName = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&branch, &parsed);
        prop_assert_eq!(branch.refname(), format!("refs/heads/{name}"));
    }

    /// OIDs are normalized to lowercase and abbreviate to a prefix.
    #[test]
    fn oid_normalized_to_lowercase(oid_str in valid_oid_string()) {
        let oid = Oid::new(oid_str.to_uppercase()).unwrap();
        prop_assert_eq!(oid.as_str(), oid_str.as_str());
        prop_assert!(oid_str.starts_with(oid.short(7)));
        prop_assert_eq!(oid.short(7).len(), 7);
    }

    /// Resolution from any directory lands on a normalized absolute path.
    #[test]
    fn resolve_from_is_absolute(
        dir in prop::collection::vec("[a-z]{1,3}", 0..4),
        rel in prop::collection::vec(prop_oneof![Just("..".to_string()), Just(".".to_string()), "[a-z]{1,3}"], 1..6),
    ) {
        let dir = format!("/{}", dir.join("/"));
        let resolved = paths::resolve_from(&dir, &rel.join("/"));
        prop_assert!(resolved.starts_with('/'));
        prop_assert_eq!(paths::normalize(&resolved), resolved.clone());
        prop_assert!(!resolved.split('/').any(|part| part == ".." || part == "."));
    }

    /// After reconciliation the working tree holds exactly the tree's files,
    /// and every write is reported before the first delete.
    #[test]
    fn reconcile_matches_the_tree(before in tree_files(), after in tree_files()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let store = MockStore::new();
            let files: Vec<(&str, &str)> = after.iter().map(|p| (p.as_str(), "merged")).collect();
            let commit = store.commit("merged", &files);
            let tree = store.commit_tree(&commit).unwrap();

            let fs = MemoryFs::with_files(before.iter().map(|p| (format!("/{p}"), "old")));
            let sink = RecordingSink::new();
            reconcile(&store, &fs, &sink, &tree).await.unwrap();

            let expected: Vec<String> = after.iter().map(|p| format!("/{p}")).collect();
            assert_eq!(fs.file_paths(), expected);

            let kinds: Vec<ChangeKind> = sink.events().into_iter().map(|e| e.kind).collect();
            let first_delete = kinds.iter().position(|k| *k == ChangeKind::Delete).unwrap_or(kinds.len());
            assert!(kinds[..first_delete].iter().all(|k| *k == ChangeKind::File));
            assert!(kinds[first_delete..].iter().all(|k| *k == ChangeKind::Delete));
            assert_eq!(kinds.len() - first_delete, before.difference(&after).count());
        });
    }
}
