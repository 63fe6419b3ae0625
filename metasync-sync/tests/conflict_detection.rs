mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rstest::rstest;
use tempfile::TempDir;

use metasync_sync::conflict::{self, ConflictStatus};
use metasync_sync::{SyncError, SyncState};

use common::{apex_class, at, context, write_source, StubApi};

fn remote_record(modified: DateTime<Utc>, body: &str) -> serde_json::Value {
    serde_json::json!({
        "attributes": {"type": "ApexClass"},
        "Id": "01p000000000001",
        "LastModifiedDate": modified.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string(),
        "LastModifiedById": "005000000000002",
        "Body": body
    })
}

#[rstest]
#[case::remote_newer(at(2, 0), true)]
#[case::same_instant(at(1, 0), false)]
#[case::remote_older(at(1, 0) - chrono::Duration::hours(3), false)]
#[tokio::test]
async fn conflict_iff_remote_is_newer(#[case] remote: DateTime<Utc>, #[case] conflicted: bool) {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    stub.set_query_records(vec![remote_record(remote, "public class Foo { /* remote */ }")]);
    let ctx = context(&dir, &stub);
    write_source(&dir, "classes/Foo.cls", "public class Foo {}");
    ctx.index
        .upsert(vec![apex_class("Foo", "01p000000000001", at(1, 0))])
        .await
        .expect("seed");
    let artifact = ctx.resolve_one("src/classes/Foo.cls".as_ref()).expect("resolve");

    let status = conflict::check(&ctx, &artifact).await.expect("check");

    assert_eq!(status.is_conflict(), conflicted);
    let index = ctx.index.snapshot().await.expect("snapshot");
    let state = index.get(&"Foo.cls".into()).expect("entry").sync_state;
    match status {
        ConflictStatus::Conflict(found) => {
            assert_eq!(found.remote_last_modified, remote);
            assert_eq!(state, SyncState::Conflicted);
            assert!(found.diff.contains("--- local/classes/Foo.cls"));
            assert!(found.diff.contains("+++ remote/classes/Foo.cls"));
            assert!(found.diff.contains("+public class Foo { /* remote */ }"));
            assert_eq!(
                common::read(&found.remote_snapshot),
                "public class Foo { /* remote */ }"
            );
            assert_eq!(
                common::read(&dir.path().join("src/classes/Foo.cls")),
                "public class Foo {}"
            );
        }
        ConflictStatus::InSync { key } => {
            assert_eq!(key.0, "Foo.cls");
            assert_eq!(state, SyncState::Clean);
        }
        other => panic!("unexpected status {other:?}"),
    }
    let queries = stub.queries();
    assert_eq!(
        queries,
        vec!["SELECT Id, LastModifiedDate, LastModifiedById, Body FROM ApexClass WHERE Name = 'Foo'"]
    );
}

#[tokio::test]
async fn snapshot_is_released_with_the_conflict() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    stub.set_query_records(vec![remote_record(at(3, 0), "remote")]);
    let ctx = context(&dir, &stub);
    write_source(&dir, "classes/Foo.cls", "local");
    ctx.index
        .upsert(vec![apex_class("Foo", "01p000000000001", at(1, 0))])
        .await
        .expect("seed");
    let artifact = ctx.resolve_one("src/classes/Foo.cls".as_ref()).expect("resolve");

    let ConflictStatus::Conflict(found) = conflict::check(&ctx, &artifact).await.expect("check")
    else {
        panic!("expected a conflict");
    };
    let snapshot = found.remote_snapshot.to_path_buf();
    assert!(snapshot.exists());
    drop(found);
    assert!(!snapshot.exists());
}

#[tokio::test]
async fn missing_remote_record_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    let ctx = context(&dir, &stub);
    write_source(&dir, "classes/Gone.cls", "class Gone {}");
    ctx.index
        .upsert(vec![apex_class("Gone", "01p000000000004", at(1, 0))])
        .await
        .expect("seed");
    let artifact = ctx.resolve_one("src/classes/Gone.cls".as_ref()).expect("resolve");

    let status = conflict::check(&ctx, &artifact).await.expect("check");
    assert!(matches!(status, ConflictStatus::RemoteMissing { .. }));
}

#[tokio::test]
async fn unindexed_artifact_is_a_precondition_error() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    let ctx = context(&dir, &stub);
    write_source(&dir, "classes/New.cls", "class New {}");
    let artifact = ctx.resolve_one("src/classes/New.cls".as_ref()).expect("resolve");

    let err = conflict::check(&ctx, &artifact).await.unwrap_err();
    assert!(matches!(err, SyncError::NoLocalIndex { .. }));
    assert_eq!(stub.count("query"), 0);
}

#[tokio::test]
async fn non_tooling_types_are_unsupported() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    let ctx = context(&dir, &stub);
    write_source(&dir, "layouts/Account-Layout.layout", "<Layout/>");
    let artifact = ctx
        .resolve_one("src/layouts/Account-Layout.layout".as_ref())
        .expect("resolve");

    let status = conflict::check(&ctx, &artifact).await.expect("check");
    assert!(matches!(status, ConflictStatus::Unsupported { ref xml_name, .. } if xml_name == "Layout"));
    assert!(stub.calls().is_empty());
}
