//! 传输后端 - 同步中负责修改的部分，每种
//! (源类型, 目标类型) 组合对应一种策略

pub mod download;
pub mod local_copy;
pub mod local_dest;
pub mod remote_copy;
pub mod remote_dest;
pub mod upload;

use crate::core::file::File;
use crate::core::summary::{BinaryUnit, Summary};
use crate::error::{Result, SyncError};
use crate::storage::Backend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::info;

pub use download::Download;
pub use local_copy::LocalCopy;
pub use remote_copy::RemoteCopy;
pub use upload::Upload;

/// 复制缓冲区大小
pub const CHUNK_SIZE: usize = 1024 * 1024;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// 每个调用返回操作后的目标条目；源已消失时
/// 返回 `SyncError::SourceNotFound`
#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn insert_folder(&self, source: &File, dest: &File) -> Result<File>;

    async fn insert_file(&self, source: &File, dest: &File) -> Result<File>;

    async fn update_file(&self, source: &File, dest: &File) -> Result<File>;

    /// 仅元数据
    async fn touch(&self, source: &File, dest: &File) -> Result<File>;

    async fn remove(&self, dest: &File) -> Result<File>;
}

/// 根据 (源, 目标) 选择传输策略
pub fn create_transfer(
    source: &Backend,
    dest: &Backend,
    summary: Arc<Summary>,
) -> Arc<dyn TransferBackend> {
    match (source, dest) {
        (Backend::Local(_), Backend::Local(_)) => Arc::new(LocalCopy::new(summary)),
        (Backend::Local(_), Backend::Remote(dest)) => Arc::new(Upload::new(dest.clone(), summary)),
        (Backend::Remote(source), Backend::Local(_)) => {
            Arc::new(Download::new(source.clone(), summary))
        }
        (Backend::Remote(_), Backend::Remote(dest)) => {
            Arc::new(RemoteCopy::new(dest.clone(), summary))
        }
    }
}

/// 单次传输的字节进度
pub(crate) struct Progress {
    label: String,
    total: u64,
    done: u64,
    started: Instant,
    logged: Instant,
}

impl Progress {
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            total,
            done: 0,
            started: now,
            logged: now,
        }
    }

    fn rate(&self, elapsed: Duration) -> u64 {
        let millis = elapsed.as_millis() as u64;
        if millis == 0 {
            return 0;
        }
        self.done.saturating_mul(1000) / millis
    }

    pub fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        if self.logged.elapsed() < PROGRESS_INTERVAL {
            return;
        }
        self.logged = Instant::now();

        let elapsed = self.started.elapsed();
        let rate = self.rate(elapsed);
        let percent = if self.total == 0 {
            100
        } else {
            self.done * 100 / self.total
        };
        let eta = if rate == 0 {
            0
        } else {
            self.total.saturating_sub(self.done) / rate
        };
        info!(
            "{}: {}% ({}B / {}s = {}B/s) ETA: {}s",
            self.label,
            percent,
            BinaryUnit(self.done),
            elapsed.as_secs(),
            BinaryUnit(rate),
            eta
        );
    }

    /// 记录一次完成的 `size` 字节复制
    pub fn finish(mut self, size: u64, summary: &Summary) {
        self.done = size;
        let elapsed = self.started.elapsed();
        summary.add_copied(size, elapsed);
        info!(
            "{}: 100% ({}B / {}s = {}B/s) #{}",
            self.label,
            BinaryUnit(size),
            elapsed.as_secs(),
            BinaryUnit(self.rate(elapsed)),
            summary.copied_files()
        );
    }
}

/// 最终重命名前写入的隐藏临时文件
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.drivesync", name))
}

/// 经临时文件将 `reader` 写入 `path`
pub(crate) async fn write_from_reader<R>(
    mut reader: R,
    path: &Path,
    progress: &mut Progress,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let temp = temp_path(path);
    let result = async {
        let mut output = tokio::fs::File::create(&temp).await?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = reader.read(&mut buffer).await.map_err(|e| {
                SyncError::from_source_io(e, &progress.label)
            })?;
            if n == 0 {
                break;
            }
            output.write_all(&buffer[..n]).await?;
            written += n as u64;
            progress.advance(n as u64);
        }
        output.flush().await?;
        output.sync_all().await?;
        Ok::<u64, SyncError>(written)
    }
    .await;

    match result {
        Ok(written) => {
            tokio::fs::rename(&temp, path).await?;
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            Err(e)
        }
    }
}

/// 后端调用所需的远程 ID
pub(crate) fn remote_id(file: &File) -> Result<&str> {
    file.remote_id()
        .ok_or_else(|| SyncError::NotFound(format!("{}: no remote id", file)))
}

/// 源端找不到即源已消失
pub(crate) fn source_vanished(error: SyncError, source: &File) -> SyncError {
    match error {
        SyncError::NotFound(_) => SyncError::SourceNotFound(source.to_string()),
        other => other,
    }
}
