//! 写入本地目标的策略共用的操作

use crate::core::file::File;
use crate::error::{Result, SyncError};
use crate::storage::local;
use filetime::FileTime;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

pub(crate) async fn mkdir(dest: &File) -> Result<()> {
    match tokio::fs::create_dir(dest.location().to_path_buf()).await {
        Err(e) if e.kind() != ErrorKind::AlreadyExists => Err(e.into()),
        _ => Ok(()),
    }
}

/// 删除 `dest`，不存在视为已删除
pub(crate) async fn remove(dest: &File) -> Result<File> {
    let path = dest.location().to_path_buf();
    let result = if dest.folder() && !dest.link() {
        tokio::fs::remove_dir_all(&path).await
    } else {
        tokio::fs::remove_file(&path).await
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(File::placeholder(dest.location().clone(), dest.folder())),
    }
}

/// 复制 `source` 的修改时间、权限位与属主
pub(crate) fn apply_metadata(source: &File, path: &Path) -> Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(source.modified(), 0))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = source.metadata();
        if let Some(mode) = metadata.mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }

        if let (Some(uid), Some(gid)) = (metadata.uid, metadata.gid) {
            let current = std::fs::metadata(path)?;
            if current.uid() != uid || current.gid() != gid {
                match std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
                    Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                        debug!("{}: keeping owner: {}", path.display(), e);
                    }
                    other => other?,
                }
            }
        }
    }

    Ok(())
}

/// 修改后重新读取 `dest`
pub(crate) async fn refresh(dest: &File) -> Result<File> {
    let location = dest.location().clone();
    tokio::task::spawn_blocking(move || local::stat(&location))
        .await
        .map_err(|e| SyncError::Other(e.to_string()))?
}

pub(crate) async fn touch(source: &File, dest: &File) -> Result<File> {
    let path = dest.location().to_path_buf();
    let owned = source.clone();
    tokio::task::spawn_blocking(move || apply_metadata(&owned, &path))
        .await
        .map_err(|e| SyncError::Other(e.to_string()))??;
    refresh(dest).await
}

pub(crate) async fn insert_folder(source: &File, dest: &File) -> Result<File> {
    mkdir(dest).await?;
    touch(source, dest).await
}
