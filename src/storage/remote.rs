//! 云盘式对象存储 - 条目以不透明 ID 寻址，
//! 路径需要逐段解析

use super::Storage;
use crate::core::file::{name_md5, File, FileMetadata, RemoteHandle};
use crate::core::folder::Folder;
use crate::error::{Result, SyncError};
use crate::location::Location;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const DEFAULT_MIME: &str = "application/octet-stream";
pub const ROOT_ID: &str = "root";

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// 存储返回的单个远程条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, deserialize_with = "string_u64")]
    pub size: Option<u64>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl RemoteEntry {
    pub fn folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// 大小以十进制字符串传输
fn string_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Number(u64),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Size::Number(n)) => Ok(Some(n)),
        Some(Size::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// 创建/更新/复制时写入的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
}

impl EntryPatch {
    /// 从 `source` 复制的元数据：修改时间与 description
    pub fn from_source(source: &File) -> Self {
        Self {
            modified_time: Utc.timestamp_opt(source.modified(), 0).single(),
            description: Some(source_metadata(source).to_description()),
            ..Default::default()
        }
    }

    /// 在 `parent_id` 下新建条目 `name`
    pub fn create(source: &File, name: &str, parent_id: &str) -> Self {
        let mime_type = if source.folder() { FOLDER_MIME } else { DEFAULT_MIME };
        Self {
            name: Some(name.to_string()),
            mime_type: Some(mime_type.to_string()),
            parents: Some(vec![parent_id.to_string()]),
            ..Self::from_source(source)
        }
    }
}

/// 为 `source` 的副本记录的 description 元数据
fn source_metadata(source: &File) -> FileMetadata {
    let kind = if source.folder() {
        crate::core::file::KIND_FOLDER
    } else {
        crate::core::file::KIND_FILE
    };
    FileMetadata {
        kind: Some(kind.to_string()),
        target: None,
        uid: source.metadata().uid,
        gid: source.metadata().gid,
        mode: source.metadata().mode,
        checksum: if source.folder() {
            None
        } else {
            source.md5().map(str::to_string)
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// 要上传到存储的本地文件
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub path: PathBuf,
    pub size: u64,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn root_id(&self) -> &str {
        ROOT_ID
    }

    async fn get(&self, id: &str) -> Result<RemoteEntry>;

    /// `parent_id` 下未回收子条目的一页
    async fn list(&self, parent_id: &str, page_token: Option<&str>) -> Result<RemotePage>;

    /// `parent_id` 下名为 `name` 的未回收子条目
    async fn find(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteEntry>>;

    async fn create(&self, patch: &EntryPatch, content: Option<&UploadSource>) -> Result<RemoteEntry>;

    async fn update(
        &self,
        id: &str,
        patch: &EntryPatch,
        content: Option<&UploadSource>,
    ) -> Result<RemoteEntry>;

    /// 服务端复制 `id`
    async fn copy(&self, id: &str, patch: &EntryPatch) -> Result<RemoteEntry>;

    async fn download(&self, id: &str) -> Result<ByteStream>;
}

/// 基于 [`RemoteStore`] 的目录工厂
pub struct RemoteStorage {
    store: Arc<dyn RemoteStore>,
    /// 路径 -> ID，仅在单次运行内有效
    ids: RwLock<HashMap<String, String>>,
    name: String,
}

impl RemoteStorage {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            ids: RwLock::new(HashMap::new()),
            name: "remote".to_string(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    fn check(location: &Location) -> Result<()> {
        if !location.remote() {
            return Err(SyncError::WrongType(location.to_string()));
        }
        Ok(())
    }

    fn cached(&self, path: &str) -> Option<String> {
        self.ids.read().ok().and_then(|ids| ids.get(path).cloned())
    }

    fn remember(&self, path: String, id: String) {
        if let Ok(mut ids) = self.ids.write() {
            ids.insert(path, id);
        }
    }

    /// 清除 `location` 及其下级的缓存 ID
    pub fn forget(&self, location: &Location) {
        let path = location.path();
        let below = format!("{}/", path);
        if let Ok(mut ids) = self.ids.write() {
            ids.retain(|p, _| p != &path && !p.starts_with(&below));
        }
    }

    /// 根据存储响应构建 `location` 处的条目
    pub fn to_file(&self, location: Location, entry: RemoteEntry) -> File {
        let metadata = FileMetadata::from_description(entry.description.as_deref());
        let folder = entry.folder();
        let modified = entry.modified_time.map(|t| t.timestamp()).unwrap_or(0);
        let md5 = if folder {
            Some(name_md5(&location.name()))
        } else {
            entry
                .md5_checksum
                .clone()
                .or_else(|| metadata.checksum.clone())
        };
        let handle = RemoteHandle {
            id: Some(entry.id.clone()),
            parent_id: entry.parents.first().cloned(),
        };

        let file = File::existing(location, folder, entry.size.unwrap_or(0), modified)
            .with_link(metadata.is_link())
            .with_metadata(metadata)
            .with_remote(handle);
        match md5 {
            Some(md5) => file.with_md5(md5),
            None => file,
        }
    }

    async fn child(&self, parent_id: &str, name: &str) -> Result<Option<RemoteEntry>> {
        let mut found = self.store.find(parent_id, name).await?;
        if found.len() > 1 {
            warn!("{} entries named '{}' under {}, using the first", found.len(), name, parent_id);
        }
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// 逐段解析路径
    async fn resolve_id(&self, location: &Location) -> Result<Option<String>> {
        let path = location.path();
        if let Some(id) = self.cached(&path) {
            return Ok(Some(id));
        }

        let parent = match location.parent() {
            Some(parent) => parent,
            None => return Ok(Some(self.store.root_id().to_string())),
        };
        let parent_id = match Box::pin(self.resolve_id(&parent)).await? {
            Some(id) => id,
            None => return Ok(None),
        };

        let entry = self.child(&parent_id, &location.name()).await?;
        Ok(entry.map(|e| {
            self.remember(path, e.id.clone());
            e.id
        }))
    }

    async fn entry(&self, location: &Location) -> Result<Option<RemoteEntry>> {
        let parent = match location.parent() {
            Some(parent) => parent,
            None => return Ok(Some(self.store.get(self.store.root_id()).await?)),
        };
        let parent_id = match self.resolve_id(&parent).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        self.child(&parent_id, &location.name()).await
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn remote(&self) -> bool {
        true
    }

    async fn file(&self, location: &Location) -> Result<File> {
        Self::check(location)?;
        match self.entry(location).await? {
            Some(entry) => {
                self.remember(location.path(), entry.id.clone());
                Ok(self.to_file(location.clone(), entry))
            }
            None => Ok(File::placeholder(location.clone(), false)),
        }
    }

    async fn create_path(&self, location: &Location) -> Result<File> {
        Self::check(location)?;
        let existing = self.file(location).await?;
        if existing.exists() {
            return Ok(existing);
        }

        let parent = location
            .parent()
            .ok_or_else(|| SyncError::NotFound(location.to_string()))?;
        let parent = Box::pin(self.create_path(&parent)).await?;
        let parent_id = parent
            .remote_id()
            .ok_or_else(|| SyncError::NotFound(parent.to_string()))?;

        debug!("Creating {}", location);
        let folder = File::placeholder(location.clone(), true);
        let entry = self
            .store
            .create(&EntryPatch::create(&folder, &location.name(), parent_id), None)
            .await?;
        self.remember(location.path(), entry.id.clone());
        Ok(self.to_file(location.clone(), entry))
    }

    async fn folder(&self, file: &File) -> Result<Folder> {
        Self::check(file.location())?;
        let id = match (file.exists(), file.remote_id()) {
            (true, Some(id)) => id.to_string(),
            _ => return Ok(self.empty(file)),
        };

        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.store.list(&id, token.as_deref()).await?;
            for entry in page.entries {
                let location = file.location().join(&entry.name);
                entries.push(self.to_file(location, entry));
            }
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(Folder::from_listing(file.clone(), entries))
    }

    async fn checksum(&self, file: &File) -> Result<File> {
        Self::check(file.location())?;
        if file.md5().is_some() || !file.exists() {
            return Ok(file.clone());
        }
        let id = match file.remote_id() {
            Some(id) => id,
            None => return Ok(file.clone()),
        };
        let entry = self.store.get(id).await?;
        Ok(match entry.md5_checksum {
            Some(md5) => file.clone().with_md5(md5),
            None => file.clone(),
        })
    }

    fn placeholder(&self, parent: &Folder, name: &str, folder: bool) -> File {
        File::placeholder(parent.file().location().join(name), folder).with_remote(RemoteHandle {
            id: None,
            parent_id: parent.file().remote_id().map(str::to_string),
        })
    }
}
