pub mod drive;
pub mod local;
pub mod memory;
pub mod remote;

use crate::core::file::File;
use crate::core::folder::Folder;
use crate::error::{Result, SyncError};
use crate::location::Location;
use async_trait::async_trait;
use std::sync::Arc;

pub use drive::DriveStore;
pub use local::LocalStorage;
pub use memory::MemoryStore;
pub use remote::{RemoteStorage, RemoteStore};

/// 某一类目录树的目录工厂
#[async_trait]
pub trait Storage: Send + Sync {
    /// 存储名称（用于日志）
    fn name(&self) -> &str;

    fn remote(&self) -> bool;

    /// 查询单个条目，不存在时返回 `exists == false`
    async fn file(&self, location: &Location) -> Result<File>;

    /// 创建 `location` 处的目录及缺失的上级目录
    async fn create_path(&self, location: &Location) -> Result<File>;

    /// 列出已存在目录的直接子条目
    async fn folder(&self, file: &File) -> Result<Folder>;

    /// 返回填充了内容 MD5 的 `file`
    async fn checksum(&self, file: &File) -> Result<File>;

    /// 尚不存在的条目对应的空目录
    fn empty(&self, file: &File) -> Folder {
        Folder::new(file.clone())
    }

    /// `parent` 下尚不存在的条目 `name`
    fn placeholder(&self, parent: &Folder, name: &str, folder: bool) -> File {
        File::placeholder(parent.file().location().join(name), folder)
    }

    /// 将多个源位置聚合为一个虚拟目录。
    /// 以分隔符结尾的位置提供其子条目，
    /// 其他位置提供自身
    async fn virtual_root(&self, locations: &[Location]) -> Result<Folder> {
        let mut root = None;
        let mut children = Vec::new();

        for location in locations {
            if location.contents() || location.is_root() {
                let base = location.clone().with_base(location);
                let file = self.file(&base).await?;
                if !file.exists() {
                    return Err(SyncError::NotFound(location.to_string()));
                }
                if !file.folder() {
                    return Err(SyncError::NotFound(format!("{} (not a folder)", location)));
                }
                let listing = self.folder(&file).await?;
                children.extend(listing.children().iter().cloned());
                children.extend(listing.duplicate().iter().cloned());
                root.get_or_insert(base);
            } else {
                let parent = location.parent().unwrap_or_else(|| location.clone());
                let file = self.file(&location.clone().with_base(&parent)).await?;
                if !file.exists() {
                    return Err(SyncError::NotFound(location.to_string()));
                }
                children.push(file);
                root.get_or_insert(parent.clone().with_base(&parent));
            }
        }

        let root = root.ok_or_else(|| SyncError::NotFound("no source location".to_string()))?;
        Ok(Folder::from_listing(
            File::existing(root, true, 0, 0),
            children,
        ))
    }
}

/// 位置对应的具体存储，用于选择传输策略
#[derive(Clone)]
pub enum Backend {
    Local(Arc<LocalStorage>),
    Remote(Arc<RemoteStorage>),
}

impl Backend {
    pub fn storage(&self) -> Arc<dyn Storage> {
        match self {
            Backend::Local(s) => s.clone(),
            Backend::Remote(s) => s.clone(),
        }
    }

    pub fn remote(&self) -> bool {
        matches!(self, Backend::Remote(_))
    }
}

/// 创建服务于 `location` 的存储
pub fn create_storage(location: &Location, store: Option<Arc<dyn RemoteStore>>) -> Result<Backend> {
    if !location.remote() {
        tracing::debug!("Using local storage for {}", location);
        return Ok(Backend::Local(Arc::new(LocalStorage::new())));
    }

    let store = store.ok_or_else(|| {
        SyncError::WrongType(format!("{}: no remote store configured", location))
    })?;
    tracing::debug!("Using remote storage for {}", location);
    Ok(Backend::Remote(Arc::new(RemoteStorage::new(store))))
}
