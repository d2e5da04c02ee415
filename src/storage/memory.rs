//! 进程内远程存储。与真实服务一样，
//! 同一父目录下允许多个同名条目

use super::remote::{
    ByteStream, EntryPatch, RemoteEntry, RemotePage, RemoteStore, UploadSource, FOLDER_MIME,
    ROOT_ID,
};
use crate::core::file::md5_hex;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct Stored {
    entry: RemoteEntry,
    content: Bytes,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Stored>,
    /// 创建顺序，即列举顺序
    order: Vec<String>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
    mutations: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let root = RemoteEntry {
            id: ROOT_ID.to_string(),
            name: "My Drive".to_string(),
            mime_type: FOLDER_MIME.to_string(),
            modified_time: Some(Utc::now()),
            ..Default::default()
        };
        let mut state = State::default();
        state.entries.insert(
            ROOT_ID.to_string(),
            Stored {
                entry: root,
                content: Bytes::new(),
            },
        );
        state.order.push(ROOT_ID.to_string());

        Self {
            state: Mutex::new(state),
            page_size: 100,
            mutations: AtomicU64::new(0),
        }
    }

    /// 按每页 `page_size` 个条目分页
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 目前已处理的创建/更新/复制调用次数
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// `id` 的存储内容
    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.lock()
            .ok()
            .and_then(|s| s.entries.get(id).map(|e| e.content.clone()))
    }

    /// `parent_id` 下所有未回收子条目，按列举顺序
    pub fn children(&self, parent_id: &str) -> Vec<RemoteEntry> {
        self.lock()
            .map(|s| Self::matching(&s, parent_id, None))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| SyncError::Other("memory store poisoned".to_string()))
    }

    fn matching(state: &State, parent_id: &str, name: Option<&str>) -> Vec<RemoteEntry> {
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|s| &s.entry)
            .filter(|e| !e.trashed && e.parents.iter().any(|p| p == parent_id))
            .filter(|e| name.map_or(true, |n| e.name == n))
            .cloned()
            .collect()
    }

    fn apply(entry: &mut RemoteEntry, patch: &EntryPatch) {
        if let Some(name) = &patch.name {
            entry.name = name.clone();
        }
        if let Some(mime_type) = &patch.mime_type {
            entry.mime_type = mime_type.clone();
        }
        if let Some(parents) = &patch.parents {
            entry.parents = parents.clone();
        }
        if let Some(modified) = patch.modified_time {
            entry.modified_time = Some(modified);
        }
        if let Some(description) = &patch.description {
            entry.description = Some(description.clone());
        }
        if let Some(trashed) = patch.trashed {
            entry.trashed = trashed;
        }
    }

    fn set_content(stored: &mut Stored, content: Bytes) {
        if stored.entry.mime_type == FOLDER_MIME {
            return;
        }
        stored.entry.size = Some(content.len() as u64);
        stored.entry.md5_checksum = Some(md5_hex(&content));
        stored.content = content;
    }

    async fn read(content: Option<&UploadSource>) -> Result<Option<Bytes>> {
        match content {
            Some(source) => {
                let display = source.path.display().to_string();
                let data = tokio::fs::read(&source.path)
                    .await
                    .map_err(|e| SyncError::from_source_io(e, &display))?;
                Ok(Some(Bytes::from(data)))
            }
            None => Ok(None),
        }
    }

    fn insert(&self, mut stored: Stored) -> Result<RemoteEntry> {
        let mut state = self.lock()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        stored.entry.id = id.clone();
        if stored.entry.modified_time.is_none() {
            stored.entry.modified_time = Some(Utc::now());
        }
        let entry = stored.entry.clone();
        state.entries.insert(id.clone(), stored);
        state.order.push(id);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(entry)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<RemoteEntry> {
        let state = self.lock()?;
        state
            .entries
            .get(id)
            .map(|s| s.entry.clone())
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    async fn list(&self, parent_id: &str, page_token: Option<&str>) -> Result<RemotePage> {
        let state = self.lock()?;
        let all = Self::matching(&state, parent_id, None);
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SyncError::Other(format!("bad page token {}", token)))?,
            None => 0,
        };
        let end = (start + self.page_size).min(all.len());
        let next_page_token = (end < all.len()).then(|| end.to_string());

        Ok(RemotePage {
            entries: all.get(start..end).map(|s| s.to_vec()).unwrap_or_default(),
            next_page_token,
        })
    }

    async fn find(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.lock()?;
        Ok(Self::matching(&state, parent_id, Some(name)))
    }

    async fn create(&self, patch: &EntryPatch, content: Option<&UploadSource>) -> Result<RemoteEntry> {
        let data = Self::read(content).await?;
        let mut stored = Stored {
            entry: RemoteEntry::default(),
            content: Bytes::new(),
        };
        Self::apply(&mut stored.entry, patch);
        Self::set_content(&mut stored, data.unwrap_or_default());
        self.insert(stored)
    }

    async fn update(
        &self,
        id: &str,
        patch: &EntryPatch,
        content: Option<&UploadSource>,
    ) -> Result<RemoteEntry> {
        let data = Self::read(content).await?;
        let mut state = self.lock()?;
        let stored = state
            .entries
            .get_mut(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        Self::apply(&mut stored.entry, patch);
        if let Some(data) = data {
            Self::set_content(stored, data);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(stored.entry.clone())
    }

    async fn copy(&self, id: &str, patch: &EntryPatch) -> Result<RemoteEntry> {
        let mut stored = {
            let state = self.lock()?;
            state
                .entries
                .get(id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?
        };
        Self::apply(&mut stored.entry, patch);
        stored.entry.trashed = false;
        self.insert(stored)
    }

    async fn download(&self, id: &str) -> Result<ByteStream> {
        let content = {
            let state = self.lock()?;
            state
                .entries
                .get(id)
                .filter(|s| !s.entry.trashed)
                .map(|s| s.content.clone())
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?
        };

        let chunks: Vec<Result<Bytes>> = content
            .chunks(DOWNLOAD_CHUNK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
