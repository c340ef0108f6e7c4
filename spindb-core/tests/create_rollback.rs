//! Failure-atomicity tests for `create`: when a late step fails, the
//! filesystem must look exactly as it did before the call.

use spindb_core::{ContainerManager, CreateSpec, Paths, RegistryClient};
use spindb_model::Engine;

fn manager(root: &std::path::Path) -> ContainerManager {
    ContainerManager::new(
        Paths::with_root(root),
        RegistryClient::with_bases(vec![]),
    )
}

#[tokio::test]
async fn failed_restore_source_rolls_back_the_container() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    // Steps 1-5 succeed (sqlite needs no binaries or server); the
    // restore source does not exist, so step 7 fails and the whole
    // create must unwind.
    let mut spec = CreateSpec::new("doomed", Engine::Sqlite);
    spec.from = Some(dir.path().join("no-such-backup.sql"));
    let err = mgr.create(spec).await.unwrap_err();
    assert_eq!(err.code(), "FILE_NOT_FOUND");

    // No container directory, no config, nothing listed.
    assert!(!dir.path().join("containers/sqlite/doomed").exists());
    assert!(mgr.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_create_removes_an_externally_placed_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let custom = dir.path().join("exports").join("doomed.sqlite");
    let mut spec = CreateSpec::new("doomed", Engine::Sqlite);
    spec.path = Some(custom.clone());
    spec.from = Some(dir.path().join("missing.sql"));

    mgr.create(spec).await.unwrap_err();
    assert!(!custom.exists(), "rollback must remove the created file");
}

#[tokio::test]
async fn failed_create_leaves_a_preexisting_data_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let custom = dir.path().join("existing.sqlite");
    tokio::fs::write(&custom, b"user data").await.unwrap();

    let mut spec = CreateSpec::new("doomed", Engine::Sqlite);
    spec.path = Some(custom.clone());
    spec.from = Some(dir.path().join("missing.sql"));

    mgr.create(spec).await.unwrap_err();
    assert_eq!(
        tokio::fs::read(&custom).await.unwrap(),
        b"user data",
        "a file the user owned before the create must survive rollback"
    );
}

#[tokio::test]
async fn successful_create_then_delete_restores_the_initial_state() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    mgr.create(CreateSpec::new("notes", Engine::Sqlite))
        .await
        .unwrap();
    mgr.delete("notes", &spindb_core::DeleteOptions::default())
        .await
        .unwrap();

    assert!(!dir.path().join("containers/sqlite/notes").exists());
    assert!(mgr.list().await.unwrap().is_empty());
}
