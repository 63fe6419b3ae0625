//! Manifest round-trip tests driven by insert/remove sequences.
//!
//! Each `#[case]` is isolated: no shared state.

use std::path::PathBuf;

use metasync_core::{classify, Members, PackageManifest, TypeCatalog};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Op {
    Insert(&'static str),
    Remove(&'static str),
}

fn source_root() -> PathBuf {
    PathBuf::from("/work/demo/src")
}

fn apply(ops: &[Op]) -> PackageManifest {
    let catalog = TypeCatalog::builtin();
    let mut manifest = PackageManifest::with_version("58.0");
    for op in ops {
        let (rel, insert) = match op {
            Op::Insert(rel) => (rel, true),
            Op::Remove(rel) => (rel, false),
        };
        let artifact =
            classify(&source_root().join(rel), &source_root(), &catalog).expect("classify");
        if insert {
            manifest.insert(&[artifact]);
        } else {
            manifest.remove(&[artifact]);
        }
    }
    manifest
}

fn sorted(manifest: &PackageManifest) -> Vec<(String, Option<Vec<String>>)> {
    manifest
        .types()
        .map(|(name, members)| {
            let members = match members {
                Members::All => None,
                Members::Named(list) => {
                    let mut list = list.clone();
                    list.sort();
                    Some(list)
                }
            };
            (name.to_string(), members)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[rstest]
#[case::single(vec![Op::Insert("classes/Foo.cls")])]
#[case::two_types(vec![Op::Insert("classes/Foo.cls"), Op::Insert("pages/Home.page")])]
#[case::insert_then_remove(vec![Op::Insert("classes/Foo.cls"), Op::Remove("classes/Foo.cls")])]
#[case::duplicate_insert(vec![
    Op::Insert("classes/Foo.cls"),
    Op::Insert("classes/Foo.cls-meta.xml"),
    Op::Insert("classes/Bar.cls"),
])]
#[case::wildcard(vec![
    Op::Insert("classes/Foo.cls"),
    Op::Insert("classes"),
    Op::Remove("classes/Foo.cls"),
])]
#[case::folders_and_bundles(vec![
    Op::Insert("reports/Sales/Pipeline.report"),
    Op::Insert("reports/Sales"),
    Op::Insert("aura/MyCmp/MyCmpController.js"),
    Op::Insert("aura/MyCmp/MyCmp.cmp"),
    Op::Remove("reports/Sales/Pipeline.report"),
])]
#[case::remove_missing(vec![Op::Remove("triggers/OnAccount.trigger")])]
fn deserialize_serialize_round_trip(#[case] ops: Vec<Op>) {
    let manifest = apply(&ops);
    let document = manifest.serialize().expect("serialize");
    let parsed = PackageManifest::deserialize(&document).expect("deserialize");
    assert_eq!(sorted(&parsed), sorted(&manifest));
    assert_eq!(parsed.version(), manifest.version());
}

#[test]
fn duplicate_inserts_collapse_to_one_member() {
    let manifest = apply(&[
        Op::Insert("classes/Foo.cls"),
        Op::Insert("classes/Foo.cls-meta.xml"),
        Op::Insert("classes/Bar.cls"),
    ]);
    assert_eq!(
        manifest.members("ApexClass"),
        Some(&Members::Named(vec!["Foo".into(), "Bar".into()]))
    );
}

#[test]
fn bundle_items_share_one_member() {
    let manifest = apply(&[
        Op::Insert("aura/MyCmp/MyCmpController.js"),
        Op::Insert("aura/MyCmp/MyCmp.cmp"),
    ]);
    assert_eq!(manifest.member_count(), 1);
    assert!(manifest
        .members("AuraDefinitionBundle")
        .unwrap()
        .contains("MyCmp"));
}

#[test]
fn parses_real_world_document() {
    let doc = br#"<?xml version="1.0" encoding="UTF-8"?>
<Package xmlns="http://soap.sforce.com/2006/04/metadata">
    <types>
        <members>*</members>
        <name>ApexClass</name>
    </types>
    <types>
        <members>Account</members>
        <members>Contact</members>
        <name>CustomObject</name>
    </types>
    <types>
        <name>ApexPage</name>
    </types>
    <version>58.0</version>
</Package>
"#;
    let manifest = PackageManifest::deserialize(doc).expect("parse");
    assert_eq!(manifest.members("ApexClass"), Some(&Members::All));
    assert_eq!(
        manifest.members("CustomObject"),
        Some(&Members::Named(vec!["Account".into(), "Contact".into()]))
    );
    assert_eq!(manifest.members("ApexPage"), Some(&Members::Named(vec![])));
    assert_eq!(manifest.version(), Some("58.0"));
}
