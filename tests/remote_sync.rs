mod common;

use common::*;
use drivesync_lib::core::file::md5_hex;
use drivesync_lib::storage::remote::{EntryPatch, RemoteStore, UploadSource, DEFAULT_MIME, FOLDER_MIME, ROOT_ID};
use drivesync_lib::storage::{MemoryStore, Storage};
use drivesync_lib::transfer::CHUNK_SIZE;
use drivesync_lib::{Location, SyncConfig};
use std::fs;
use std::sync::Arc;

fn remote(path: &str) -> Location {
    Location::create(&format!("gdrive://{}", path))
}

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_page_size(3))
}

async fn folder_id(store: &Arc<MemoryStore>, path: &str) -> String {
    let storage = drivesync_lib::storage::RemoteStorage::new(store.clone());
    let file = storage.file(&remote(path)).await.unwrap();
    file.remote_id().unwrap().to_string()
}

#[tokio::test]
async fn upload_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    for i in 0..5 {
        write(&src.join(format!("f{}", i)), format!("file {}", i).as_bytes());
    }
    write(&src.join("d/e/deep.txt"), b"deep");

    let store = store();
    let first = run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;
    assert_eq!(first.copied_files, 6);

    let backup = folder_id(&store, "/backup").await;
    let names: Vec<String> = store.children(&backup).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["d", "f0", "f1", "f2", "f3", "f4"]);

    let mutations = store.mutations();
    let second = run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;
    assert_eq!(store.mutations(), mutations);
    assert_eq!(second.copied_files, 0);
    assert_eq!(second.checked_files, 8);
}

#[tokio::test]
async fn round_trip_through_the_remote() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let sizes = [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1];
    for size in sizes {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        write(&src.join(format!("size_{}", size)), &data);
    }
    write(&src.join("nested/deeper/leaf.txt"), "héllo wörld".as_bytes());

    let store = store();
    run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/mirror"),
    )
    .await;

    let back = dir.path().join("back");
    let report = run(
        recursive(),
        &remote_backend(&store),
        &[remote("/mirror/")],
        &local_backend(),
        &local(&back),
    )
    .await;
    assert_eq!(report.copied_files, 6);

    assert_eq!(tree(&back), tree(&src));
    for entry in tree(&src).iter().filter(|e| !e.ends_with('/')) {
        assert_eq!(fs::read(back.join(entry)).unwrap(), fs::read(src.join(entry)).unwrap(), "{}", entry);
        assert_eq!(mtime(&back.join(entry)), MTIME, "{}", entry);
    }

    let again = run(
        recursive(),
        &remote_backend(&store),
        &[remote("/mirror/")],
        &local_backend(),
        &local(&back),
    )
    .await;
    assert_eq!(again.copied_files, 0);
}

#[tokio::test]
async fn server_side_copy_between_remote_folders() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("a.txt"), b"alpha");
    write(&src.join("sub/b.txt"), b"beta");

    let store = store();
    run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/one"),
    )
    .await;
    run(
        recursive(),
        &remote_backend(&store),
        &[remote("/one/")],
        &remote_backend(&store),
        &remote("/two"),
    )
    .await;

    let two = folder_id(&store, "/two").await;
    let a = store
        .children(&two)
        .into_iter()
        .find(|e| e.name == "a.txt")
        .unwrap();
    assert_eq!(store.content(&a.id).unwrap().as_ref(), b"alpha");
    let sub = folder_id(&store, "/two/sub").await;
    assert_eq!(store.children(&sub).len(), 1);

    // 源已修改：新副本替换旧条目
    write(&src.join("a.txt"), b"alpha, revised");
    run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/one"),
    )
    .await;
    run(
        recursive(),
        &remote_backend(&store),
        &[remote("/one/")],
        &remote_backend(&store),
        &remote("/two"),
    )
    .await;
    let copies: Vec<_> = store
        .children(&two)
        .into_iter()
        .filter(|e| e.name == "a.txt")
        .collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(store.content(&copies[0].id).unwrap().as_ref(), b"alpha, revised");
}

#[tokio::test]
async fn duplicate_names_are_drained() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("dup"), b"from source");
    write(&src.join("single"), b"single");

    let store = store();
    let backup = store
        .create(
            &EntryPatch {
                name: Some("backup".to_string()),
                mime_type: Some(FOLDER_MIME.to_string()),
                parents: Some(vec![ROOT_ID.to_string()]),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    let stale = dir.path().join("stale");
    fs::write(&stale, b"stale").unwrap();
    for _ in 0..2 {
        store
            .create(
                &EntryPatch {
                    name: Some("dup".to_string()),
                    mime_type: Some(DEFAULT_MIME.to_string()),
                    parents: Some(vec![backup.id.clone()]),
                    ..Default::default()
                },
                Some(&UploadSource {
                    path: stale.clone(),
                    size: 5,
                }),
            )
            .await
            .unwrap();
    }

    let storage = drivesync_lib::storage::RemoteStorage::new(store.clone());
    let listed = storage
        .folder(&storage.file(&remote("/backup")).await.unwrap())
        .await
        .unwrap();
    assert_eq!(listed.children().len(), 1);
    assert_eq!(listed.duplicate().len(), 1);

    let config = SyncConfig {
        delete: true,
        ..recursive()
    };
    run(
        config,
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;

    let dups: Vec<_> = store
        .children(&backup.id)
        .into_iter()
        .filter(|e| e.name == "dup")
        .collect();
    assert_eq!(dups.len(), 1);
    assert_eq!(store.content(&dups[0].id).unwrap().as_ref(), b"from source");
    assert_eq!(dups[0].md5_checksum.as_deref(), Some(md5_hex(b"from source").as_str()));
}

#[tokio::test]
async fn dry_run_never_mutates_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("a.txt"), b"a");
    write(&src.join("d/b.txt"), b"b");
    write(&src.join("d/e/c.txt"), b"c");

    let store = store();
    let config = SyncConfig {
        dry_run: true,
        delete: true,
        ..recursive()
    };
    let report = run(
        config,
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;
    assert_eq!(store.mutations(), 0);
    assert!(store.children(ROOT_ID).is_empty());
    assert_eq!(report.checked_files, 5);
    assert_eq!(report.total_files, 5);
    assert_eq!(report.copied_files, 0);
}

#[tokio::test]
async fn remote_delete_moves_to_trash() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("keep"), b"keep");
    write(&src.join("drop"), b"drop");

    let store = store();
    run(
        recursive(),
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;
    let backup = folder_id(&store, "/backup").await;
    let dropped = store
        .children(&backup)
        .into_iter()
        .find(|e| e.name == "drop")
        .unwrap();

    fs::remove_file(src.join("drop")).unwrap();
    let config = SyncConfig {
        delete: true,
        ..recursive()
    };
    run(
        config,
        &local_backend(),
        &[contents(&src)],
        &remote_backend(&store),
        &remote("/backup"),
    )
    .await;

    let names: Vec<String> = store.children(&backup).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["keep"]);
    assert!(store.get(&dropped.id).await.unwrap().trashed);
}
