//! 目录树条目

use crate::location::Location;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const KIND_FILE: &str = "file";
pub const KIND_FOLDER: &str = "folder";
pub const KIND_LINK: &str = "link";

/// 远程存储无法原生保存的元数据，以 JSON 形式
/// 存入条目的 description 字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// 符号链接目标
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Unix 权限位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// 复制来源的内容 MD5
    #[serde(rename = "cs", default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl FileMetadata {
    /// 解析 description 字段，无法解析时为空元数据
    pub fn from_description(description: Option<&str>) -> Self {
        description
            .and_then(|d| serde_json::from_str(d).ok())
            .unwrap_or_default()
    }

    pub fn to_description(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn is_link(&self) -> bool {
        self.kind.as_deref() == Some(KIND_LINK)
    }

    /// 去掉内容校验和的元数据
    pub fn without_checksum(&self) -> Self {
        Self {
            checksum: None,
            ..self.clone()
        }
    }
}

/// 条目的远程标识
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteHandle {
    /// 不透明的条目 ID，创建前为 `None`
    pub id: Option<String>,
    pub parent_id: Option<String>,
}

/// 目录树中的一个条目。构建后不再修改，
/// 所有 `with_*` 都返回新值
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    location: Location,
    folder: bool,
    exists: bool,
    link: bool,
    size: u64,
    modified: i64,
    md5: Option<String>,
    metadata: FileMetadata,
    remote: Option<RemoteHandle>,
}

impl File {
    /// （尚）不存在的条目
    pub fn placeholder(location: Location, folder: bool) -> Self {
        let md5 = folder.then(|| name_md5(&location.name()));
        Self {
            location,
            folder,
            exists: false,
            link: false,
            size: 0,
            modified: 0,
            md5,
            metadata: FileMetadata::default(),
            remote: None,
        }
    }

    /// 已存在的条目，目录大小始终为 0
    pub fn existing(location: Location, folder: bool, size: u64, modified: i64) -> Self {
        Self {
            exists: true,
            size: if folder { 0 } else { size },
            modified,
            ..Self::placeholder(location, folder)
        }
    }

    pub fn with_link(self, link: bool) -> Self {
        Self { link, ..self }
    }

    pub fn with_md5(self, md5: impl Into<String>) -> Self {
        Self {
            md5: Some(md5.into()),
            ..self
        }
    }

    pub fn with_metadata(self, metadata: FileMetadata) -> Self {
        Self { metadata, ..self }
    }

    pub fn with_remote(self, remote: RemoteHandle) -> Self {
        Self {
            remote: Some(remote),
            ..self
        }
    }

    pub fn with_location(self, location: Location) -> Self {
        Self { location, ..self }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn name(&self) -> String {
        self.location.name()
    }

    pub fn folder(&self) -> bool {
        self.folder
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn link(&self) -> bool {
        self.link
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 修改时间，自 epoch 起的整秒数
    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn remote(&self) -> Option<&RemoteHandle> {
        self.remote.as_ref()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote.as_ref().and_then(|r| r.id.as_deref())
    }

    /// 与 `other` 的纯元数据字段是否不同
    pub fn metadata_differs(&self, other: &File) -> bool {
        if self.modified != other.modified {
            return true;
        }
        if let (Some(a), Some(b)) = (self.metadata.mode, other.metadata.mode) {
            if a != b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&self.metadata.target, &other.metadata.target) {
            if a != b {
                return true;
            }
        }
        false
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}

pub fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 目录的标识哈希，由名称计算
pub fn name_md5(name: &str) -> String {
    md5_hex(name.as_bytes())
}

/// 将修改时间转换为整秒
pub fn whole_seconds(time: std::time::SystemTime) -> i64 {
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}
