//! 本地到远程

use super::remote_dest::RemoteDest;
use super::{remote_id, Progress, TransferBackend};
use crate::core::file::File;
use crate::core::summary::Summary;
use crate::error::Result;
use crate::storage::remote::{EntryPatch, RemoteStorage, UploadSource};
use async_trait::async_trait;
use std::sync::Arc;

pub struct Upload {
    dest: RemoteDest,
    summary: Arc<Summary>,
}

impl Upload {
    pub fn new(dest: Arc<RemoteStorage>, summary: Arc<Summary>) -> Self {
        Self {
            dest: RemoteDest::new(dest),
            summary,
        }
    }

    fn content(source: &File) -> UploadSource {
        UploadSource {
            path: source.location().to_path_buf(),
            size: source.size(),
        }
    }
}

#[async_trait]
impl TransferBackend for Upload {
    async fn insert_folder(&self, source: &File, dest: &File) -> Result<File> {
        self.dest.insert_folder(source, dest).await
    }

    async fn insert_file(&self, source: &File, dest: &File) -> Result<File> {
        let progress = Progress::new(dest.to_string(), source.size());
        let patch = self.dest.create_patch(source, dest)?;
        let entry = self
            .dest
            .store()
            .create(&patch, Some(&Self::content(source)))
            .await?;
        progress.finish(entry.size.unwrap_or(source.size()), &self.summary);

        Ok(self.dest.storage().to_file(dest.location().clone(), entry))
    }

    async fn update_file(&self, source: &File, dest: &File) -> Result<File> {
        let progress = Progress::new(dest.to_string(), source.size());
        let entry = self
            .dest
            .store()
            .update(
                remote_id(dest)?,
                &EntryPatch::from_source(source),
                Some(&Self::content(source)),
            )
            .await?;
        progress.finish(entry.size.unwrap_or(source.size()), &self.summary);

        Ok(self.dest.storage().to_file(dest.location().clone(), entry))
    }

    async fn touch(&self, source: &File, dest: &File) -> Result<File> {
        self.dest.touch(source, dest).await
    }

    async fn remove(&self, dest: &File) -> Result<File> {
        self.dest.remove(dest).await
    }
}
