//! 应用配置模块 (`config.json`)

use crate::core::executor::{RequestExecutor, DEFAULT_BASE_DELAY_MS, DEFAULT_RETRIES};
use crate::error::Result;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "drivesync";
pub const CONFIG_FILE: &str = "config.json";
pub const TOKEN_ENV: &str = "DRIVESYNC_ACCESS_TOKEN";

/// 请求执行器的重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn executor(&self) -> RequestExecutor {
        RequestExecutor::new(self.retries, self.base_delay_ms)
    }
}

/// 远程云盘端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// 断点续传分块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_chunk_size() -> u64 {
    8 * 1024 * 1024
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            access_token: None,
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl RemoteConfig {
    /// 访问令牌，环境变量优先于配置文件
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.access_token.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl AppConfig {
    /// 从 `path` 加载配置，文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// 当前用户的应用目录
pub fn app_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}
