//! 写入远程目标的策略共用的操作

use super::remote_id;
use crate::core::file::File;
use crate::error::{Result, SyncError};
use crate::storage::remote::{EntryPatch, RemoteStorage, RemoteStore};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct RemoteDest {
    storage: Arc<RemoteStorage>,
}

impl RemoteDest {
    pub fn new(storage: Arc<RemoteStorage>) -> Self {
        Self { storage }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        self.storage.store()
    }

    pub fn storage(&self) -> &RemoteStorage {
        &self.storage
    }

    /// 尚未创建的条目的父目录 ID
    pub fn parent_id<'a>(&self, dest: &'a File) -> Result<&'a str> {
        dest.remote()
            .and_then(|r| r.parent_id.as_deref())
            .ok_or_else(|| SyncError::NotFound(format!("{}: no parent id", dest)))
    }

    /// 以 `source` 为蓝本创建 `dest` 的补丁
    pub fn create_patch(&self, source: &File, dest: &File) -> Result<EntryPatch> {
        Ok(EntryPatch::create(source, &dest.name(), self.parent_id(dest)?))
    }

    pub async fn insert_folder(&self, source: &File, dest: &File) -> Result<File> {
        let patch = self.create_patch(source, dest)?;
        let entry = self.store().create(&patch, None).await?;
        Ok(self.storage.to_file(dest.location().clone(), entry))
    }

    /// 将 `dest` 移入回收站
    pub async fn remove(&self, dest: &File) -> Result<File> {
        let patch = EntryPatch {
            trashed: Some(true),
            ..Default::default()
        };
        self.store().update(remote_id(dest)?, &patch, None).await?;
        self.storage.forget(dest.location());
        Ok(File::placeholder(dest.location().clone(), dest.folder()))
    }

    pub async fn touch(&self, source: &File, dest: &File) -> Result<File> {
        let entry = self
            .store()
            .update(remote_id(dest)?, &EntryPatch::from_source(source), None)
            .await?;
        Ok(self.storage.to_file(dest.location().clone(), entry))
    }
}
