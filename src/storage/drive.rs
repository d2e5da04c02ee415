//! Drive v3 REST 客户端

use super::remote::{
    ByteStream, EntryPatch, RemoteEntry, RemotePage, RemoteStore, UploadSource, DEFAULT_MIME,
};
use crate::config::RemoteConfig;
use crate::core::executor::RequestExecutor;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

const FIELDS: &str = "id,name,mimeType,parents,size,md5Checksum,modifiedTime,description,trashed";
const BOUNDARY: &str = "drivesync_boundary_5f1c";
/// 续传分块必须是该值的整数倍
const CHUNK_GRANULARITY: u64 = 256 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    files: Vec<RemoteEntry>,
    next_page_token: Option<String>,
}

enum ChunkOutcome {
    Done(RemoteEntry),
    /// 服务器确认的下一个偏移
    Resume(u64),
}

pub struct DriveStore {
    client: Client,
    api_base: String,
    upload_base: String,
    token: String,
    page_size: u32,
    chunk_size: u64,
    executor: RequestExecutor,
}

impl DriveStore {
    pub fn new(config: &RemoteConfig, token: String, executor: RequestExecutor) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let chunk_size = (config.chunk_size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            token,
            page_size: config.page_size,
            chunk_size,
            executor,
        })
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.api_base)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_base, id)
    }

    /// 将失败状态转换为错误，限流视为暂时性错误
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(message));
        }
        let status = if status == StatusCode::FORBIDDEN && message.contains("ateLimitExceeded") {
            StatusCode::TOO_MANY_REQUESTS
        } else {
            status
        };
        Err(SyncError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_once(&self, id: &str) -> Result<RemoteEntry> {
        let response = self
            .client
            .get(self.file_url(id))
            .bearer_auth(&self.token)
            .query(&[("fields", FIELDS)])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn query_once(&self, q: &str, page_token: Option<&str>) -> Result<ListResponse> {
        let fields = format!("nextPageToken,files({})", FIELDS);
        let page_size = self.page_size.to_string();
        let mut query = vec![
            ("q", q),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .client
            .get(self.files_url())
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// 仅元数据的创建（`id == None`）或更新
    async fn write_metadata_once(&self, id: Option<&str>, patch: &EntryPatch) -> Result<RemoteEntry> {
        let request = match id {
            Some(id) => self.client.patch(self.file_url(id)),
            None => self.client.post(self.files_url()),
        };
        let response = request
            .bearer_auth(&self.token)
            .query(&[("fields", FIELDS)])
            .json(patch)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn multipart_once(
        &self,
        id: Option<&str>,
        patch: &EntryPatch,
        content: Bytes,
    ) -> Result<RemoteEntry> {
        let metadata = serde_json::to_vec(patch)?;
        let mime = patch.mime_type.as_deref().unwrap_or(DEFAULT_MIME);

        let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(&metadata);
        body.extend_from_slice(format!("\r\n--{}\r\nContent-Type: {}\r\n\r\n", BOUNDARY, mime).as_bytes());
        body.extend_from_slice(&content);
        body.extend_from_slice(format!("\r\n--{}--", BOUNDARY).as_bytes());

        let request = match id {
            Some(id) => self
                .client
                .patch(format!("{}/files/{}", self.upload_base, id)),
            None => self.client.post(format!("{}/files", self.upload_base)),
        };
        let response = request
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// 打开续传会话并返回其 URI
    async fn start_session_once(
        &self,
        id: Option<&str>,
        patch: &EntryPatch,
        size: u64,
    ) -> Result<String> {
        let request = match id {
            Some(id) => self
                .client
                .patch(format!("{}/files/{}", self.upload_base, id)),
            None => self.client.post(format!("{}/files", self.upload_base)),
        };
        let response = request
            .bearer_auth(&self.token)
            .query(&[("uploadType", "resumable"), ("fields", FIELDS)])
            .header("X-Upload-Content-Length", size.to_string())
            .json(patch)
            .send()
            .await?;
        let response = Self::check(response).await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| SyncError::Other("resumable session without location".to_string()))
    }

    async fn put_chunk_once(
        &self,
        session: &str,
        chunk: Bytes,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome> {
        let end = offset + chunk.len() as u64;
        let range = if chunk.is_empty() {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", offset, end - 1, total)
        };

        let response = self
            .client
            .put(session)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_RANGE, range)
            .body(chunk)
            .send()
            .await?;

        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let next = response
                .headers()
                .get(reqwest::header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(acknowledged_offset)
                .unwrap_or(0);
            return Ok(ChunkOutcome::Resume(next));
        }

        Ok(ChunkOutcome::Done(Self::check(response).await?.json().await?))
    }

    async fn copy_once(&self, id: &str, patch: &EntryPatch) -> Result<RemoteEntry> {
        let response = self
            .client
            .post(format!("{}/copy", self.file_url(id)))
            .bearer_auth(&self.token)
            .query(&[("fields", FIELDS)])
            .json(patch)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn download_once(&self, id: &str) -> Result<Response> {
        let response = self
            .client
            .get(self.file_url(id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        Self::check(response).await
    }

    async fn upload(
        &self,
        id: Option<&str>,
        patch: &EntryPatch,
        source: &UploadSource,
    ) -> Result<RemoteEntry> {
        if source.size <= self.chunk_size {
            let display = source.path.display().to_string();
            let content = Bytes::from(
                tokio::fs::read(&source.path)
                    .await
                    .map_err(|e| SyncError::from_source_io(e, &display))?,
            );
            return self
                .executor
                .execute("upload", || self.multipart_once(id, patch, content.clone()))
                .await;
        }

        let session = self
            .executor
            .execute("start upload", || self.start_session_once(id, patch, source.size))
            .await?;

        let mut offset = 0;
        loop {
            let chunk = read_chunk(source, offset, self.chunk_size).await?;
            let outcome = self
                .executor
                .execute("upload chunk", || {
                    self.put_chunk_once(&session, chunk.clone(), offset, source.size)
                })
                .await?;
            match outcome {
                ChunkOutcome::Done(entry) => return Ok(entry),
                ChunkOutcome::Resume(next) => {
                    debug!(
                        "{}: {}/{} bytes acknowledged",
                        source.path.display(),
                        next,
                        source.size
                    );
                    offset = next;
                }
            }
        }
    }
}

/// 将 `bytes=0-N` 解析为 `N + 1`
fn acknowledged_offset(range: &str) -> Option<u64> {
    let last = range.strip_prefix("bytes=")?.split('-').nth(1)?;
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}

/// 转义 Drive 查询字符串中的值
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn read_chunk(source: &UploadSource, offset: u64, size: u64) -> Result<Bytes> {
    let display = source.path.display().to_string();
    let map = |e: std::io::Error| SyncError::from_source_io(e, &display);

    let mut file = tokio::fs::File::open(&source.path).await.map_err(map)?;
    file.seek(SeekFrom::Start(offset)).await.map_err(map)?;
    let mut buffer = Vec::with_capacity(size as usize);
    file.take(size).read_to_end(&mut buffer).await.map_err(map)?;
    // 源文件在列举后变小了
    if buffer.is_empty() && offset < source.size {
        return Err(SyncError::SourceNotFound(display));
    }
    Ok(Bytes::from(buffer))
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn get(&self, id: &str) -> Result<RemoteEntry> {
        self.executor.execute("get", || self.get_once(id)).await
    }

    async fn list(&self, parent_id: &str, page_token: Option<&str>) -> Result<RemotePage> {
        let q = format!("'{}' in parents and trashed = false", escape_query(parent_id));
        let response = self
            .executor
            .execute("list", || self.query_once(&q, page_token))
            .await?;
        Ok(RemotePage {
            entries: response.files,
            next_page_token: response.next_page_token,
        })
    }

    async fn find(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteEntry>> {
        let q = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(parent_id)
        );
        let mut found = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let response = self
                .executor
                .execute("find", || self.query_once(&q, token.as_deref()))
                .await?;
            found.extend(response.files);
            match response.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(found),
            }
        }
    }

    async fn create(&self, patch: &EntryPatch, content: Option<&UploadSource>) -> Result<RemoteEntry> {
        match content {
            Some(source) => self.upload(None, patch, source).await,
            None => {
                self.executor
                    .execute("create", || self.write_metadata_once(None, patch))
                    .await
            }
        }
    }

    async fn update(
        &self,
        id: &str,
        patch: &EntryPatch,
        content: Option<&UploadSource>,
    ) -> Result<RemoteEntry> {
        match content {
            Some(source) => self.upload(Some(id), patch, source).await,
            None => {
                self.executor
                    .execute("update", || self.write_metadata_once(Some(id), patch))
                    .await
            }
        }
    }

    async fn copy(&self, id: &str, patch: &EntryPatch) -> Result<RemoteEntry> {
        self.executor
            .execute("copy", || self.copy_once(id, patch))
            .await
    }

    async fn download(&self, id: &str) -> Result<ByteStream> {
        let response = self
            .executor
            .execute("download", || self.download_once(id))
            .await?;

        Ok(response.bytes_stream().map_err(SyncError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledged_offset() {
        assert_eq!(acknowledged_offset("bytes=0-262143"), Some(262144));
        assert_eq!(acknowledged_offset("bytes=0-"), None);
        assert_eq!(acknowledged_offset("garbage"), None);
    }

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_chunk_size_rounding() {
        let config = RemoteConfig {
            chunk_size: 300 * 1024,
            ..Default::default()
        };
        let store = DriveStore::new(&config, "token".into(), RequestExecutor::default()).unwrap();
        assert_eq!(store.chunk_size, CHUNK_GRANULARITY);
    }

    #[tokio::test]
    async fn test_read_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"0123456789").unwrap();
        let source = UploadSource { path, size: 10 };
        assert_eq!(&read_chunk(&source, 4, 3).await.unwrap()[..], b"456");
        assert_eq!(&read_chunk(&source, 8, 5).await.unwrap()[..], b"89");
    }

    #[tokio::test]
    async fn test_read_chunk_past_shrunken_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"0123").unwrap();
        let source = UploadSource { path, size: 10 };
        assert_eq!(&read_chunk(&source, 0, 3).await.unwrap()[..], b"012");
        let err = read_chunk(&source, 4, 3).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceNotFound(_)));
        assert!(!err.is_transient());
    }
}
