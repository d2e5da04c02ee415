#![allow(dead_code)]

use drivesync_lib::core::summary::SyncReport;
use drivesync_lib::storage::{Backend, LocalStorage, MemoryStore, RemoteStorage};
use drivesync_lib::{Location, SyncConfig, SyncEngine};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// 测试目录树的固定修改时间
pub const MTIME: i64 = 1_600_000_000;

pub fn local(path: &Path) -> Location {
    Location::create(&path.to_string_lossy())
}

/// `path` 目录下的内容
pub fn contents(path: &Path) -> Location {
    Location::create(&format!("{}/", path.to_string_lossy()))
}

pub fn write(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(MTIME, 0)).unwrap();
}

pub fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

pub fn local_backend() -> Backend {
    Backend::Local(Arc::new(LocalStorage::new()))
}

/// 共享存储上的全新路径缓存，相当于一次新的运行
pub fn remote_backend(store: &Arc<MemoryStore>) -> Backend {
    Backend::Remote(Arc::new(RemoteStorage::new(store.clone())))
}

pub fn recursive() -> SyncConfig {
    SyncConfig {
        recursive: true,
        ..Default::default()
    }
}

pub async fn run(
    config: SyncConfig,
    source: &Backend,
    sources: &[Location],
    dest: &Backend,
    dest_location: &Location,
) -> SyncReport {
    SyncEngine::from_backends(config, source, dest)
        .sync(sources, dest_location)
        .await
        .unwrap()
}

/// 递归列出 `root` 下排序后的相对路径，目录以
/// `/` 结尾
pub fn tree(root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .map(|e| {
            let relative = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if e.file_type().is_dir() {
                format!("{}/", relative)
            } else {
                relative
            }
        })
        .collect();
    entries.sort();
    entries
}
