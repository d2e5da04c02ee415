//! 运行计数器与结束报告

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 引擎与传输后端共用的计数器
#[derive(Debug)]
pub struct Summary {
    started: Instant,
    checked_files: AtomicU64,
    checked_size: AtomicU64,
    copied_files: AtomicU64,
    copied_size: AtomicU64,
    /// 传输数据耗时（毫秒）
    copied_time: AtomicU64,
    total_files: AtomicU64,
}

impl Default for Summary {
    fn default() -> Self {
        Self::new()
    }
}

impl Summary {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            checked_files: AtomicU64::new(0),
            checked_size: AtomicU64::new(0),
            copied_files: AtomicU64::new(0),
            copied_size: AtomicU64::new(0),
            copied_time: AtomicU64::new(0),
            total_files: AtomicU64::new(0),
        }
    }

    pub fn add_checked(&self, size: u64) {
        self.checked_files.fetch_add(1, Ordering::Relaxed);
        self.checked_size.fetch_add(size, Ordering::Relaxed);
    }

    pub fn add_copied(&self, size: u64, elapsed: Duration) {
        self.copied_files.fetch_add(1, Ordering::Relaxed);
        self.copied_size.fetch_add(size, Ordering::Relaxed);
        self.copied_time
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_total(&self, files: u64) {
        self.total_files.fetch_add(files, Ordering::Relaxed);
    }

    pub fn checked_files(&self) -> u64 {
        self.checked_files.load(Ordering::Relaxed)
    }

    pub fn total_files(&self) -> u64 {
        self.total_files.load(Ordering::Relaxed)
    }

    pub fn copied_files(&self) -> u64 {
        self.copied_files.load(Ordering::Relaxed)
    }

    pub fn copied_size(&self) -> u64 {
        self.copied_size.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> SyncReport {
        SyncReport {
            checked_files: self.checked_files(),
            checked_size: self.checked_size.load(Ordering::Relaxed),
            copied_files: self.copied_files(),
            copied_size: self.copied_size(),
            copied_time_ms: self.copied_time.load(Ordering::Relaxed),
            total_files: self.total_files(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// 计数器快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub checked_files: u64,
    pub checked_size: u64,
    pub copied_files: u64,
    pub copied_size: u64,
    pub copied_time_ms: u64,
    pub total_files: u64,
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// 复制速率（字节/秒）
    pub fn rate(&self) -> u64 {
        if self.copied_time_ms == 0 {
            return 0;
        }
        self.copied_size.saturating_mul(1000) / self.copied_time_ms
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Copied {} files ({}B / {:.1}s = {}B/s) Checked {} files ({}B) in {:.1}s",
            self.copied_files,
            BinaryUnit(self.copied_size),
            self.copied_time_ms as f64 / 1000.0,
            BinaryUnit(self.rate()),
            self.checked_files,
            BinaryUnit(self.checked_size),
            self.elapsed_ms as f64 / 1000.0,
        )
    }
}

const PREFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// 带二进制前缀的字节数，数值达到 10000 时
/// 进位到下一个前缀
#[derive(Debug, Clone, Copy)]
pub struct BinaryUnit(pub u64);

impl fmt::Display for BinaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        let mut prefix = 0;
        while value >= 10000 && prefix + 1 < PREFIXES.len() {
            value /= 1024;
            prefix += 1;
        }
        write!(f, "{} {}", value, PREFIXES[prefix])
    }
}
