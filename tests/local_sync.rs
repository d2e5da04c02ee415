mod common;

use async_trait::async_trait;
use common::*;
use drivesync_lib::core::file::File;
use drivesync_lib::core::folder::Folder;
use drivesync_lib::core::summary::Summary;
use drivesync_lib::filter::{Filter, FilterChain};
use drivesync_lib::storage::{LocalStorage, Storage};
use drivesync_lib::transfer::LocalCopy;
use drivesync_lib::{Location, Result, SyncConfig, SyncEngine};
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn second_run_copies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("a.txt"), b"alpha");
    write(&src.join("d/b.txt"), b"beta");
    write(&src.join("d/e/c.txt"), b"");

    let backend = local_backend();
    let first = run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(first.copied_files, 3);
    assert_eq!(
        tree(&dst),
        vec!["a.txt", "d/", "d/b.txt", "d/e/", "d/e/c.txt"]
    );
    assert_eq!(mtime(&dst.join("d/b.txt")), MTIME);

    let second = run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(second.copied_files, 0);
    assert_eq!(second.checked_files, 5);
}

#[tokio::test]
async fn source_without_separator_is_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let other = dir.path().join("other");
    write(&src.join("a.txt"), b"a");
    write(&other.join("x.txt"), b"x");
    write(&other.join("y.txt"), b"y");

    let backend = local_backend();
    let dst = dir.path().join("dst");
    run(recursive(), &backend, &[local(&src)], &backend, &local(&dst)).await;
    assert_eq!(tree(&dst), vec!["src/", "src/a.txt"]);

    let merged = dir.path().join("merged");
    run(
        recursive(),
        &backend,
        &[local(&src.join("a.txt")), contents(&other)],
        &backend,
        &local(&merged),
    )
    .await;
    assert_eq!(tree(&merged), vec!["a.txt", "x.txt", "y.txt"]);
}

#[tokio::test]
async fn missing_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let backend = local_backend();
    let result = SyncEngine::from_backends(recursive(), &backend, &backend)
        .sync(&[local(&dir.path().join("none"))], &local(&dir.path().join("dst")))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dest_must_be_a_folder() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("src/a"), b"a");
    write(&dir.path().join("dst"), b"file");
    let backend = local_backend();
    let result = SyncEngine::from_backends(recursive(), &backend, &backend)
        .sync(&[contents(&dir.path().join("src"))], &local(&dir.path().join("dst")))
        .await;
    assert!(result.is_err());
}

fn filtered(filters: Vec<Filter>) -> SyncConfig {
    SyncConfig {
        filters: FilterChain::new(filters),
        ..recursive()
    }
}

#[tokio::test]
async fn first_matching_filter_wins() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    for name in ["keep1", "kill1", "other"] {
        write(&src.join(name), name.as_bytes());
    }
    let backend = local_backend();

    let include_first = dir.path().join("include_first");
    let config = filtered(vec![
        Filter::include("keep*").unwrap(),
        Filter::exclude("k*").unwrap(),
    ]);
    run(config, &backend, &[contents(&src)], &backend, &local(&include_first)).await;
    assert_eq!(tree(&include_first), vec!["keep1", "other"]);

    let exclude_first = dir.path().join("exclude_first");
    let config = filtered(vec![
        Filter::exclude("k*").unwrap(),
        Filter::include("keep*").unwrap(),
    ]);
    let report = run(config, &backend, &[contents(&src)], &backend, &local(&exclude_first)).await;
    assert_eq!(tree(&exclude_first), vec!["other"]);
    assert_eq!(report.checked_files, 3);
}

#[tokio::test]
async fn excluded_folders_are_not_entered() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("build/out.o"), b"o");
    write(&src.join("lib/build"), b"not a folder");
    write(&src.join("lib/main.rs"), b"fn main() {}");
    let dst = dir.path().join("dst");

    let backend = local_backend();
    let config = filtered(vec![Filter::exclude("build/").unwrap()]);
    run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(tree(&dst), vec!["lib/", "lib/build", "lib/main.rs"]);
}

#[tokio::test]
async fn delete_excluded_trashes_excluded_counterparts() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("a.log"), b"log");
    write(&src.join("a.txt"), b"txt");
    write(&dst.join("a.log"), b"old log");
    write(&dst.join("stale"), b"stale");

    let backend = local_backend();
    let config = SyncConfig {
        delete_excluded: true,
        ..filtered(vec![Filter::exclude("*.log").unwrap()])
    };
    run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    // 没有 --delete 时多余条目保留
    assert_eq!(tree(&dst), vec!["a.txt", "stale"]);
}

#[tokio::test]
async fn delete_replaces_entry_of_other_type() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("X/inner.txt"), b"inner");
    write(&dst.join("X"), b"stale file");
    write(&dst.join("extra"), b"extra");

    let backend = local_backend();
    run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert!(dst.join("X").is_file(), "no --delete keeps the stale file");
    assert!(dst.join("extra").exists());

    let config = SyncConfig {
        delete: true,
        ..recursive()
    };
    run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(tree(&dst), vec!["X/", "X/inner.txt"]);
    assert_eq!(fs::read(dst.join("X/inner.txt")).unwrap(), b"inner");
}

#[tokio::test]
async fn update_mode_keeps_newer_destination() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("f"), b"source content");
    write(&dst.join("f"), b"dest");
    filetime::set_file_mtime(
        dst.join("f"),
        filetime::FileTime::from_unix_time(MTIME + 3600, 0),
    )
    .unwrap();

    let backend = local_backend();
    let config = SyncConfig {
        update: true,
        ..recursive()
    };
    let report = run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(report.copied_files, 0);
    assert_eq!(fs::read(dst.join("f")).unwrap(), b"dest");

    run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(fs::read(dst.join("f")).unwrap(), b"source content");
    assert_eq!(mtime(&dst.join("f")), MTIME);
}

#[tokio::test]
async fn equal_content_with_other_time_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("f"), b"same");
    write(&dst.join("f"), b"same");
    filetime::set_file_mtime(dst.join("f"), filetime::FileTime::from_unix_time(MTIME - 60, 0))
        .unwrap();

    let backend = local_backend();
    let report = run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(report.copied_files, 0);
    assert_eq!(mtime(&dst.join("f")), MTIME);
}

#[tokio::test]
async fn checksum_mode_catches_same_size_changes() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("f"), b"1234");
    write(&dst.join("f"), b"abcd");

    let backend = local_backend();
    let report = run(recursive(), &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(report.copied_files, 0, "fast mode trusts size and time");

    let config = SyncConfig {
        checksum: true,
        ..recursive()
    };
    let report = run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert_eq!(report.copied_files, 1);
    assert_eq!(fs::read(dst.join("f")).unwrap(), b"1234");
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("a.txt"), b"a");
    write(&src.join("d/b.txt"), b"b");
    write(&src.join("d/e/c.txt"), b"c");

    let backend = local_backend();
    let config = SyncConfig {
        dry_run: true,
        delete: true,
        ..recursive()
    };
    let report = run(config, &backend, &[contents(&src)], &backend, &local(&dst)).await;
    assert!(!dst.exists());
    assert_eq!(report.checked_files, 5);
    assert_eq!(report.copied_files, 0);
    assert_eq!(report.copied_size, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn links_are_skipped_unless_followed() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("target.txt"), b"target");
    std::os::unix::fs::symlink(src.join("target.txt"), src.join("link")).unwrap();

    let backend = local_backend();
    let skipped = dir.path().join("skipped");
    run(recursive(), &backend, &[contents(&src)], &backend, &local(&skipped)).await;
    assert_eq!(tree(&skipped), vec!["target.txt"]);

    let followed = dir.path().join("followed");
    let config = SyncConfig {
        copy_links: true,
        ..recursive()
    };
    run(config, &backend, &[contents(&src)], &backend, &local(&followed)).await;
    assert_eq!(fs::read(followed.join("link")).unwrap(), b"target");
    assert!(!fs::symlink_metadata(followed.join("link")).unwrap().file_type().is_symlink());
}

/// 列举时额外报告一个已消失条目的本地存储
struct Ghosted {
    inner: LocalStorage,
}

#[async_trait]
impl Storage for Ghosted {
    fn name(&self) -> &str {
        "ghosted"
    }

    fn remote(&self) -> bool {
        false
    }

    async fn file(&self, location: &Location) -> Result<File> {
        self.inner.file(location).await
    }

    async fn create_path(&self, location: &Location) -> Result<File> {
        self.inner.create_path(location).await
    }

    async fn folder(&self, file: &File) -> Result<Folder> {
        let folder = self.inner.folder(file).await?;
        let ghost = File::existing(file.location().join("ghost"), false, 10, MTIME);
        Ok(folder.with_child(ghost))
    }

    async fn checksum(&self, file: &File) -> Result<File> {
        self.inner.checksum(file).await
    }
}

#[tokio::test]
async fn vanished_source_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    write(&src.join("a.txt"), b"a");
    write(&src.join("z.txt"), b"z");

    let summary = Arc::new(Summary::new());
    let engine = SyncEngine::new(
        recursive(),
        Arc::new(Ghosted {
            inner: LocalStorage::new(),
        }),
        Arc::new(LocalStorage::new()),
        Arc::new(LocalCopy::new(summary.clone())),
        summary,
    );
    let report = engine.sync(&[contents(&src)], &local(&dst)).await.unwrap();
    assert_eq!(tree(&dst), vec!["a.txt", "z.txt"]);
    assert_eq!(report.checked_files, 3);
    assert_eq!(report.copied_files, 2);
}
