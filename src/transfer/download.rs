//! 远程到本地

use super::{local_dest, remote_id, source_vanished, write_from_reader, Progress, TransferBackend};
use crate::core::file::File;
use crate::core::summary::Summary;
use crate::error::Result;
use crate::storage::remote::RemoteStorage;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;

pub struct Download {
    source: Arc<RemoteStorage>,
    summary: Arc<Summary>,
}

impl Download {
    pub fn new(source: Arc<RemoteStorage>, summary: Arc<Summary>) -> Self {
        Self { source, summary }
    }

    async fn copy(&self, source: &File, dest: &File) -> Result<File> {
        let path = dest.location().to_path_buf();
        let mut progress = Progress::new(dest.to_string(), source.size());

        // 空条目没有可下载的内容
        let written = if source.size() == 0 {
            tokio::fs::File::create(&path).await?;
            0
        } else {
            let stream = self
                .source
                .store()
                .download(remote_id(source)?)
                .await
                .map_err(|e| source_vanished(e, source))?;
            let reader = StreamReader::new(
                stream.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
            );
            write_from_reader(reader, &path, &mut progress).await?
        };
        progress.finish(written, &self.summary);

        local_dest::touch(source, dest).await
    }
}

#[async_trait]
impl TransferBackend for Download {
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
