//! 本地到本地

use super::{local_dest, write_from_reader, Progress, TransferBackend};
use crate::core::file::File;
use crate::core::summary::Summary;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LocalCopy {
    summary: Arc<Summary>,
}

impl LocalCopy {
    pub fn new(summary: Arc<Summary>) -> Self {
        Self { summary }
    }

    async fn copy(&self, source: &File, dest: &File) -> Result<File> {
        let source_path = source.location().to_path_buf();
        let input = tokio::fs::File::open(&source_path)
            .await
            .map_err(|e| SyncError::from_source_io(e, &source.to_string()))?;

        let mut progress = Progress::new(dest.to_string(), source.size());
        let written = write_from_reader(input, &dest.location().to_path_buf(), &mut progress).await?;
        progress.finish(written, &self.summary);

        local_dest::touch(source, dest).await
    }
}

#[async_trait]
impl TransferBackend for LocalCopy {
    async fn insert_folder(&self, source: &File, dest: &File) -> Result<File> {
        local_dest::insert_folder(source, dest).await
    }

    async fn insert_file(&self, source: &File, dest: &File) -> Result<File> {
        self.copy(source, dest).await
    }

    async fn update_file(&self, source: &File, dest: &File) -> Result<File> {
        self.copy(source, dest).await
    }

    async fn touch(&self, source: &File, dest: &File) -> Result<File> {
        local_dest::touch(source, dest).await
    }

    async fn remove(&self, dest: &File) -> Result<File> {
        local_dest::remove(dest).await
    }
}
