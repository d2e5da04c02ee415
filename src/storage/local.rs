use super::Storage;
use crate::core::file::{whole_seconds, File, FileMetadata, KIND_FILE, KIND_FOLDER, KIND_LINK};
use crate::core::folder::Folder;
use crate::error::{Result, SyncError};
use crate::location::Location;
use async_trait::async_trait;
use md5::{Digest, Md5};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MD5_BUFFER_SIZE: usize = 64 * 1024;

pub struct LocalStorage {
    name: String,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    fn check(location: &Location) -> Result<()> {
        if location.remote() {
            return Err(SyncError::WrongType(location.to_string()));
        }
        Ok(())
    }
}

/// 构建 `location` 的条目，路径不存在时返回占位条目
pub(crate) fn stat(location: &Location) -> Result<File> {
    let path = location.to_path_buf();
    let link_meta = match std::fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(File::placeholder(location.clone(), false));
        }
        Err(e) => return Err(e.into()),
    };

    let link = link_meta.file_type().is_symlink();
    // 链接返回目标信息，悬空链接返回自身
    let meta = if link {
        std::fs::metadata(&path).unwrap_or_else(|_| link_meta.clone())
    } else {
        link_meta
    };

    let folder = meta.is_dir();
    let modified = whole_seconds(meta.modified()?);
    let target = if link {
        std::fs::read_link(&path)
            .ok()
            .map(|t| t.to_string_lossy().into_owned())
    } else {
        None
    };
    let kind = if link {
        KIND_LINK
    } else if folder {
        KIND_FOLDER
    } else {
        KIND_FILE
    };

    let mut metadata = FileMetadata {
        kind: Some(kind.to_string()),
        target,
        ..Default::default()
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.uid = Some(meta.uid());
        metadata.gid = Some(meta.gid());
        metadata.mode = Some(meta.mode() & 0o7777);
    }

    Ok(File::existing(location.clone(), folder, meta.len(), modified)
        .with_link(link)
        .with_metadata(metadata))
}

fn list(file: &File) -> Result<Vec<File>> {
    let root = file.location().to_path_buf();
    let mut entries = Vec::new();

    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) {
                    warn!("{}: vanished while listing", root.display());
                    continue;
                }
                return Err(e
                    .into_io_error()
                    .map(SyncError::Io)
                    .unwrap_or_else(|| SyncError::Other(format!("{}: listing loop", root.display()))));
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let child = stat(&file.location().join(&name))?;
        if !child.exists() {
            warn!("{}: vanished while listing", entry.path().display());
            continue;
        }
        entries.push(child);
    }

    Ok(entries)
}

fn md5_of(path: &Path) -> Result<String> {
    let display = path.display().to_string();
    let mut input = std::fs::File::open(path).map_err(|e| SyncError::from_source_io(e, &display))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; MD5_BUFFER_SIZE];
    loop {
        let n = input
            .read(&mut buffer)
            .map_err(|e| SyncError::from_source_io(e, &display))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn remote(&self) -> bool {
        false
    }

    async fn file(&self, location: &Location) -> Result<File> {
        Self::check(location)?;
        let location = location.clone();
        tokio::task::spawn_blocking(move || stat(&location))
            .await
            .map_err(|e| SyncError::Other(e.to_string()))?
    }

    async fn create_path(&self, location: &Location) -> Result<File> {
        Self::check(location)?;
        debug!("Creating {}", location);
        tokio::fs::create_dir_all(location.to_path_buf()).await?;
        self.file(location).await
    }

    async fn folder(&self, file: &File) -> Result<Folder> {
        Self::check(file.location())?;
        if !file.exists() {
            return Ok(self.empty(file));
        }

        // walkdir 是阻塞的，放到阻塞线程执行
        let listed = file.clone();
        let entries = tokio::task::spawn_blocking(move || list(&listed))
            .await
            .map_err(|e| SyncError::Other(e.to_string()))??;

        Ok(Folder::from_listing(file.clone(), entries))
    }

    async fn checksum(&self, file: &File) -> Result<File> {
        Self::check(file.location())?;
        if file.md5().is_some() || !file.exists() {
            return Ok(file.clone());
        }

        let path = file.location().to_path_buf();
        let md5 = tokio::task::spawn_blocking(move || md5_of(&path))
            .await
            .map_err(|e| SyncError::Other(e.to_string()))??;

        Ok(file.clone().with_md5(md5))
    }
}
