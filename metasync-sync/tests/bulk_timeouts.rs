mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use metasync_core::PackageManifest;
use metasync_remote::{DeployOptions, DeployResult, DeployStatus, RetrieveResult};
use metasync_sync::bulk::{self, RetrieveOptions, RETRIEVE_ARCHIVE, RETRIEVE_TREE};
use metasync_sync::SyncError;

use common::{apex_class, at, context, read, write_source, zip_of, StubApi};

const DEPLOY_BUDGET: Duration = Duration::from_secs(30);

#[tokio::test(start_paused = true)]
async fn deploy_that_never_finishes_times_out_without_touching_the_index() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    stub.set_deploy_result(DeployResult {
        done: false,
        status: DeployStatus::InProgress,
        retrieve_result: Some(RetrieveResult {
            done: true,
            success: true,
            file_properties: vec![apex_class("Foo", "01p000000000001", at(9, 0))],
            ..RetrieveResult::default()
        }),
        ..DeployResult::default()
    });
    let ctx = context(&dir, &stub);
    ctx.index
        .upsert(vec![apex_class("Foo", "01p000000000001", at(1, 0))])
        .await
        .expect("seed index");
    let before = ctx.index.snapshot().await.expect("snapshot");

    let err = bulk::deploy(&ctx, b"archive".to_vec(), &DeployOptions::for_compile())
        .await
        .unwrap_err();

    match err {
        SyncError::Timeout {
            operation,
            elapsed,
            budget,
        } => {
            assert_eq!(operation, "deploy");
            assert_eq!(budget, DEPLOY_BUDGET);
            assert!(elapsed >= budget);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.count("submit_deploy"), 1);
    assert!(stub.count("check_deploy_status") > 0);
    assert_eq!(ctx.index.snapshot().await.expect("snapshot"), before);
}

#[tokio::test(start_paused = true)]
async fn retrieve_that_never_finishes_times_out_before_any_local_change() {
    let dir = TempDir::new().expect("tempdir");
    let stub = Arc::new(StubApi::new());
    stub.set_retrieve_result(RetrieveResult {
        done: false,
        status: "InProgress".into(),
        file_properties: vec![apex_class("Foo", "01p000000000001", at(9, 0))],
        zip_file: Some(zip_of(&[("classes/Foo.cls", "public class Foo { /* server */ }")])),
        ..RetrieveResult::default()
    });
    let ctx = context(&dir, &stub);
    write_source(&dir, "classes/Foo.cls", "public class Foo {}");
    ctx.index
        .upsert(vec![apex_class("Foo", "01p000000000001", at(1, 0))])
        .await
        .expect("seed index");
    let before = ctx.index.snapshot().await.expect("snapshot");
    let workdir = TempDir::new().expect("workdir");
    let mut manifest = PackageManifest::with_version("58.0");
    manifest.insert_member("ApexClass", "*");

    let err = bulk::retrieve(
        &ctx,
        &manifest,
        workdir.path(),
        RetrieveOptions {
            replace_index: true,
            merge_into_project: true,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Timeout { operation: "retrieve", budget, .. } if budget == DEPLOY_BUDGET
    ));
    assert_eq!(ctx.index.snapshot().await.expect("snapshot"), before);
    assert_eq!(
        read(&dir.path().join("src/classes/Foo.cls")),
        "public class Foo {}"
    );
    assert!(!workdir.path().join(RETRIEVE_ARCHIVE).exists());
    assert!(!workdir.path().join(RETRIEVE_TREE).exists());
}
