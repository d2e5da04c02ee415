//! 远程到远程，使用服务端复制

use super::remote_dest::RemoteDest;
use super::{remote_id, source_vanished, Progress, TransferBackend};
use crate::core::file::File;
use crate::core::summary::Summary;
use crate::error::Result;
use crate::storage::remote::RemoteStorage;
use async_trait::async_trait;
use std::sync::Arc;

pub struct RemoteCopy {
    dest: RemoteDest,
    summary: Arc<Summary>,
}

impl RemoteCopy {
    pub fn new(dest: Arc<RemoteStorage>, summary: Arc<Summary>) -> Self {
        Self {
            dest: RemoteDest::new(dest),
            summary,
        }
    }

    /// 以 `dest` 的名称将 `source` 复制到 `dest` 所在目录
    async fn copy(&self, source: &File, dest: &File, parent_id: &str) -> Result<File> {
        let progress = Progress::new(dest.to_string(), source.size());
        let mut patch = self.dest.create_patch(source, dest)?;
        patch.parents = Some(vec![parent_id.to_string()]);
        // 复制保留源的内容类型
        patch.mime_type = None;

        let entry = self
            .dest
            .store()
            .copy(remote_id(source)?, &patch)
            .await
            .map_err(|e| source_vanished(e, source))?;
        progress.finish(entry.size.unwrap_or(source.size()), &self.summary);

        Ok(self.dest.storage().to_file(dest.location().clone(), entry))
    }
}

#[async_trait]
impl TransferBackend for RemoteCopy {
    async fn insert_folder(&self, source: &File, dest: &File) -> Result<File> {
        self.dest.insert_folder(source, dest).await
    }

    async fn insert_file(&self, source: &File, dest: &File) -> Result<File> {
        let parent_id = self.dest.parent_id(dest)?.to_string();
        self.copy(source, dest, &parent_id).await
    }

    /// 复制无法覆盖已有内容：先复制，再将旧条目
    /// 移入回收站
    async fn update_file(&self, source: &File, dest: &File) -> Result<File> {
        let parent_id = self.dest.parent_id(dest)?.to_string();
        let copied = self.copy(source, dest, &parent_id).await?;
        self.dest.remove(dest).await?;
        Ok(copied)
    }

    async fn touch(&self, source: &File, dest: &File) -> Result<File> {
        self.dest.touch(source, dest).await
    }

    async fn remove(&self, dest: &File) -> Result<File> {
        self.dest.remove(dest).await
    }
}
