//! Filesystem storage collaborator behavior against a temp directory.

use paperflow::session::SessionId;
use paperflow::storage::{FsStorage, ItemRef, Storage, StorageError};

struct Fixture {
    _dir: tempfile::TempDir,
    storage: FsStorage,
    inbox: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().join("input"), dir.path().join("output"));
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).expect("inbox");
    Fixture {
        storage,
        inbox,
        _dir: dir,
    }
}

fn incoming(fixture: &Fixture, name: &str, contents: &str) -> ItemRef {
    let path = fixture.inbox.join(name);
    std::fs::write(&path, contents).expect("write incoming");
    ItemRef::new(path.to_string_lossy().into_owned())
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let fixture = fixture();
    let session = SessionId::from("alice");

    assert!(!fixture.storage.area_exists(&session).await);
    fixture.storage.bootstrap(&session).await.unwrap();
    assert!(fixture.storage.area_exists(&session).await);
    fixture.storage.bootstrap(&session).await.unwrap();
    assert!(fixture.storage.area_exists(&session).await);
}

#[tokio::test]
async fn staged_files_list_in_stored_name_order() {
    let fixture = fixture();
    let session = SessionId::from("alice");
    fixture.storage.bootstrap(&session).await.unwrap();

    let second = incoming(&fixture, "b.pdf", "bee");
    let first = incoming(&fixture, "a.pdf", "ay");
    fixture
        .storage
        .stage(&session, &second, "02_b.pdf")
        .await
        .unwrap();
    fixture
        .storage
        .stage(&session, &first, "01_a.pdf")
        .await
        .unwrap();

    let staged = fixture.storage.list_inputs(&session).await.unwrap();
    assert_eq!(staged.len(), 2);
    assert!(staged[0].as_str().ends_with("01_a.pdf"));
    assert!(staged[1].as_str().ends_with("02_b.pdf"));
}

#[tokio::test]
async fn staging_a_missing_source_is_not_found() {
    let fixture = fixture();
    let session = SessionId::from("alice");
    fixture.storage.bootstrap(&session).await.unwrap();

    let ghost = ItemRef::new(fixture.inbox.join("ghost.pdf").to_string_lossy().into_owned());
    let result = fixture.storage.stage(&session, &ghost, "01_ghost.pdf").await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn delete_removes_a_single_staged_input() {
    let fixture = fixture();
    let session = SessionId::from("alice");
    fixture.storage.bootstrap(&session).await.unwrap();

    let source = incoming(&fixture, "a.pdf", "ay");
    let staged = fixture
        .storage
        .stage(&session, &source, "01_a.pdf")
        .await
        .unwrap();
    fixture.storage.delete(&session, &staged).await.unwrap();
    assert!(fixture.storage.list_inputs(&session).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_refuses_paths_outside_the_session_area() {
    let fixture = fixture();
    let session = SessionId::from("alice");
    fixture.storage.bootstrap(&session).await.unwrap();

    let outside = incoming(&fixture, "a.pdf", "ay");
    let result = fixture.storage.delete(&session, &outside).await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn purge_empties_the_area_but_keeps_it() {
    let fixture = fixture();
    let session = SessionId::from("alice");
    fixture.storage.bootstrap(&session).await.unwrap();

    let source = incoming(&fixture, "a.pdf", "ay");
    fixture
        .storage
        .stage(&session, &source, "01_a.pdf")
        .await
        .unwrap();

    fixture.storage.purge(&session).await.unwrap();
    assert!(fixture.storage.area_exists(&session).await);
    assert!(fixture.storage.list_inputs(&session).await.unwrap().is_empty());

    // purging an already-empty area is fine
    fixture.storage.purge(&session).await.unwrap();
}

#[tokio::test]
async fn sessions_do_not_share_areas() {
    let fixture = fixture();
    let alice = SessionId::from("alice");
    let bob = SessionId::from("bob");
    fixture.storage.bootstrap(&alice).await.unwrap();
    fixture.storage.bootstrap(&bob).await.unwrap();

    let source = incoming(&fixture, "a.pdf", "ay");
    fixture
        .storage
        .stage(&alice, &source, "01_a.pdf")
        .await
        .unwrap();

    assert_eq!(fixture.storage.list_inputs(&alice).await.unwrap().len(), 1);
    assert!(fixture.storage.list_inputs(&bob).await.unwrap().is_empty());
}
