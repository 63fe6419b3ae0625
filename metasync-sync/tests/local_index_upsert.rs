mod common;

use rstest::{fixture, rstest};

use metasync_core::TypeCatalog;
use metasync_remote::FileProperties;
use metasync_sync::local_index::{self, IndexUpdate, LocalIndex};

use common::{apex_class, at, props};

#[fixture]
fn catalog() -> TypeCatalog {
    TypeCatalog::builtin()
}

#[fixture]
fn existing(catalog: TypeCatalog) -> LocalIndex {
    let mut index = LocalIndex::new();
    index.upsert_file_properties(
        &catalog,
        &[
            apex_class("Foo", "01p000000000001", at(1, 0)),
            apex_class("Bar", "01p000000000002", at(1, 0)),
        ],
    );
    index
}

fn incoming() -> Vec<FileProperties> {
    vec![
        apex_class("Foo", "01p000000000001", at(3, 0)),
        props("Home", "ApexPage", "pages/Home.page", "066000000000001", at(3, 0)),
        props("Widget", "Gizmo", "gizmos/Widget.gizmo", "0zz000000000001", at(3, 0)),
    ]
}

#[rstest]
fn upsert_is_a_function_of_state_and_input(catalog: TypeCatalog, existing: LocalIndex) {
    let mut first = existing.clone();
    let mut second = existing;
    let a = first.upsert_file_properties(&catalog, &incoming());
    let b = second.upsert_file_properties(&catalog, &incoming());

    assert_eq!(a, b);
    assert_eq!(a, IndexUpdate { upserted: 2, skipped: 1 });
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
}

#[rstest]
fn repeated_upsert_is_idempotent(catalog: TypeCatalog, mut existing: LocalIndex) {
    existing.upsert_file_properties(&catalog, &incoming());
    let once = existing.clone();
    existing.upsert_file_properties(&catalog, &incoming());
    assert_eq!(existing, once);
    assert_eq!(existing.len(), 3);
}

#[rstest]
#[case::by_type_name("ApexTrigger", "triggers/Audit.trigger", "Audit.trigger")]
#[case::by_suffix_when_type_unknown("Mystery", "classes/Audit.cls", "Audit.cls")]
#[case::folder_item("Report", "reports/Sales/Audit.report", "Audit.report")]
fn keys_follow_the_resolved_type(
    catalog: TypeCatalog,
    #[case] type_name: &str,
    #[case] file_name: &str,
    #[case] key: &str,
) {
    let mut index = LocalIndex::new();
    let update = index.upsert_file_properties(
        &catalog,
        &[props("Audit", type_name, file_name, "01q000000000001", at(2, 0))],
    );
    assert_eq!(update.upserted, 1);
    assert!(index.get(&key.into()).is_some(), "missing {key}");
}

#[rstest]
fn persisted_index_reloads_identically(existing: LocalIndex) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join(".metasync/local_store.json");
    local_index::save_at(&path, &existing).expect("save");
    let loaded = local_index::load_at(&path).expect("load");
    assert_eq!(loaded.entries, existing);
}

#[test]
fn legacy_flat_documents_still_load() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("local_store.json");
    std::fs::write(
        &path,
        r#"{
            "Foo.cls": {
                "id": "01p000000000001",
                "fullName": "Foo",
                "type": "ApexClass",
                "fileName": "classes/Foo.cls",
                "lastModifiedDate": "2024-01-01T00:00:00.000Z"
            }
        }"#,
    )
    .expect("write legacy");

    let loaded = local_index::load_at(&path).expect("load");
    let entry = loaded.entries.get(&"Foo.cls".into()).expect("entry");
    assert_eq!(entry.last_modified_date, at(1, 0));
}
