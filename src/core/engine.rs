//! 同步引擎 - 将源目录树递归同步到目标目录树
//!
//! 每对目录依次经过：回收阶段清理目标快照，同步阶段为每个源子条目
//! 决定并执行一个操作，最后递归进入子目录

use crate::core::file::File;
use crate::core::folder::Folder;
use crate::core::summary::{Summary, SyncReport};
use crate::error::{Result, SyncError};
use crate::filter::FilterChain;
use crate::location::Location;
use crate::storage::{Backend, Storage};
use crate::transfer::{create_transfer, TransferBackend};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 引擎开关，与命令行选项一一对应
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// 先比较内容哈希，再比较大小
    pub checksum: bool,
    /// 不覆盖比源更新的目标条目
    pub update: bool,
    /// 将重复、多余及类型不同的目标条目移入回收站
    pub delete: bool,
    /// 将源被排除的目标条目移入回收站
    pub delete_excluded: bool,
    /// 跟随符号链接而不是跳过
    pub copy_links: bool,
    pub dry_run: bool,
    pub recursive: bool,
    pub filters: FilterChain,
}

impl SyncConfig {
    fn skips_link(&self, file: &File) -> bool {
        file.link() && !self.copy_links
    }
}

/// 未执行操作的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    Link,
    /// 同名但类型不同，且未被回收
    TypeMismatch,
    DestinationNewer,
    UpToDate,
}

/// 同步阶段对单个源条目执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    /// 仅元数据
    Touch,
    Skip(SkipReason),
}

/// 根据目标对应条目决定 `source` 的操作，
/// 第一个命中的规则生效
pub fn decide(config: &SyncConfig, source: &File, dest: Option<&File>) -> Operation {
    if config.filters.is_excluded(source) {
        return Operation::Skip(SkipReason::Excluded);
    }
    if config.skips_link(source) {
        return Operation::Skip(SkipReason::Link);
    }

    let dest = match dest {
        Some(dest) if dest.exists() => dest,
        _ => return Operation::Insert,
    };

    if dest.folder() != source.folder() {
        return Operation::Skip(SkipReason::TypeMismatch);
    }
    if config.update && dest.modified() > source.modified() {
        return Operation::Skip(SkipReason::DestinationNewer);
    }
    if source.folder() {
        return Operation::Skip(SkipReason::UpToDate);
    }

    if config.checksum {
        if hashes_differ(source, dest) || source.size() != dest.size() {
            return Operation::Update;
        }
        if source.metadata_differs(dest) {
            return Operation::Touch;
        }
        return Operation::Skip(SkipReason::UpToDate);
    }

    if source.size() != dest.size() {
        return Operation::Update;
    }
    if source.metadata_differs(dest) {
        // 大小相同但时间不同：只有已知且相等的哈希才能免于复制
        return match (source.md5(), dest.md5()) {
            (Some(a), Some(b)) if a == b => Operation::Touch,
            _ => Operation::Update,
        };
    }
    Operation::Skip(SkipReason::UpToDate)
}

/// 仅一侧已知哈希也视为不同
fn hashes_differ(source: &File, dest: &File) -> bool {
    source.md5() != dest.md5()
}

pub struct SyncEngine {
    config: SyncConfig,
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    transfer: Arc<dyn TransferBackend>,
    summary: Arc<Summary>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn Storage>,
        dest: Arc<dyn Storage>,
        transfer: Arc<dyn TransferBackend>,
        summary: Arc<Summary>,
    ) -> Self {
        Self {
            config,
            source,
            dest,
            transfer,
            summary,
        }
    }

    /// 基于一对后端创建引擎，并选择对应的传输策略
    pub fn from_backends(config: SyncConfig, source: &Backend, dest: &Backend) -> Self {
        let summary = Arc::new(Summary::new());
        let transfer = create_transfer(source, dest, summary.clone());
        Self::new(config, source.storage(), dest.storage(), transfer, summary)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn summary(&self) -> &Arc<Summary> {
        &self.summary
    }

    /// 将 `sources` 同步到 `dest` 目录
    pub async fn sync(&self, sources: &[Location], dest: &Location) -> Result<SyncReport> {
        info!(
            "Synchronizing {} source(s) from {} storage to {} storage at {}",
            sources.len(),
            self.source.name(),
            self.dest.name(),
            dest
        );
        let source_root = self.source.virtual_root(sources).await?;

        let dest_location = dest.clone().with_base(dest);
        let dest_file = self.dest.file(&dest_location).await?;
        let dest_root = if dest_file.exists() {
            if !dest_file.folder() {
                return Err(SyncError::Other(format!("{} is not a folder", dest)));
            }
            self.dest.folder(&dest_file).await?
        } else if self.config.dry_run {
            info!("Creating destination {} (dry run)", dest);
            self.dest.empty(&File::placeholder(dest_location, true))
        } else {
            info!("Creating destination {}", dest);
            let created = self.dest.create_path(&dest_location).await?;
            self.dest.folder(&created).await?
        };

        self.sync_folder(source_root, dest_root).await?;

        let report = self.summary.report();
        info!("{}", report);
        Ok(report)
    }

    /// 同步一对目录，再深度优先处理子目录
    fn sync_folder(&self, source: Folder, dest: Folder) -> BoxFuture<'_, Result<()>> {
        async move {
            debug!("Synchronizing {} -> {}", source.file(), dest.file());
            let dest = self.trash(&source, dest).await?;

            self.summary.add_total(source.len() as u64);
            let dest = self.sync_children(&source, dest).await?;

            if self.config.recursive {
                self.recurse(&source, &dest).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn remove(&self, file: &File) -> Result<File> {
        if self.config.dry_run {
            return Ok(file.clone());
        }
        self.transfer.remove(file).await
    }

    /// 依次执行回收阶段，每个阶段处理上一阶段的输出
    async fn trash(&self, source: &Folder, dest: Folder) -> Result<Folder> {
        let mut dest = dest;
        if self.config.delete {
            dest = self.trash_duplicate(dest).await?;
            dest = self.trash_extraneous(source, dest).await?;
            dest = self.trash_different_type(source, dest).await?;
        }
        if self.config.delete_excluded {
            dest = self.trash_excluded(source, dest).await?;
        }
        Ok(dest)
    }

    /// 重复的名称无法对应到单个源条目，
    /// 同名条目全部回收
    async fn trash_duplicate(&self, dest: Folder) -> Result<Folder> {
        if dest.duplicate().is_empty() {
            return Ok(dest);
        }

        let names: HashSet<String> = dest.duplicate().iter().map(File::name).collect();
        for file in dest.duplicate() {
            info!("Trashing duplicate {}", file);
            self.remove(file).await?;
        }
        for file in dest.children().iter().filter(|c| names.contains(&c.name())) {
            info!("Trashing duplicate {}", file);
            self.remove(file).await?;
        }

        Ok(dest
            .without_duplicate()
            .with_children_where(|c| !names.contains(&c.name())))
    }

    async fn trash_extraneous(&self, source: &Folder, dest: Folder) -> Result<Folder> {
        let mut trashed = HashSet::new();
        for file in dest.children() {
            if !source.contains(&file.name()) {
                info!("Trashing extraneous {}", file);
                self.remove(file).await?;
                trashed.insert(file.name());
            }
        }
        Ok(dest.with_children_where(|c| !trashed.contains(&c.name())))
    }

    async fn trash_different_type(&self, source: &Folder, dest: Folder) -> Result<Folder> {
        let mut trashed = HashSet::new();
        for file in dest.children() {
            if let Some(counterpart) = source.child(&file.name()) {
                if counterpart.folder() != file.folder() {
                    info!("Trashing different type {}", file);
                    self.remove(file).await?;
                    trashed.insert(file.name());
                }
            }
        }
        Ok(dest.with_children_where(|c| !trashed.contains(&c.name())))
    }

    async fn trash_excluded(&self, source: &Folder, dest: Folder) -> Result<Folder> {
        let mut trashed = HashSet::new();
        for file in dest.children() {
            let excluded = source
                .child(&file.name())
                .map_or(false, |c| self.config.filters.is_excluded(c));
            if excluded {
                info!("Trashing excluded {}", file);
                self.remove(file).await?;
                trashed.insert(file.name());
            }
        }
        Ok(dest.with_children_where(|c| !trashed.contains(&c.name())))
    }

    /// 比较源与目标时是否需要内容哈希
    fn needs_checksum(&self, source: &File, dest: Option<&File>) -> bool {
        let dest = match dest {
            Some(dest) if dest.exists() => dest,
            _ => return false,
        };
        if source.folder() || dest.folder() || source.size() != dest.size() {
            return false;
        }
        if self.config.filters.is_excluded(source) || self.config.skips_link(source) {
            return false;
        }
        if self.config.update && dest.modified() > source.modified() {
            return false;
        }
        self.config.checksum || source.metadata_differs(dest)
    }

    async fn sync_children(&self, source: &Folder, dest: Folder) -> Result<Folder> {
        let mut dest = dest;
        for child in source.children() {
            self.summary.add_checked(child.size());
            let counterpart = dest.child(&child.name()).cloned();

            match self.sync_child(child, counterpart.as_ref(), &dest).await {
                Ok(Some(file)) => dest = dest.with_child_replaced(file),
                Ok(None) => {}
                Err(SyncError::SourceNotFound(what)) => {
                    warn!("Skipping {}: source vanished ({})", child, what);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dest)
    }

    /// 决定并执行单个源条目的操作，
    /// 目标有变化时返回操作后的目标条目
    async fn sync_child(
        &self,
        source: &File,
        dest: Option<&File>,
        dest_folder: &Folder,
    ) -> Result<Option<File>> {
        let (source, dest) = if self.needs_checksum(source, dest) {
            let hashed_source = self.source.checksum(source).await?;
            let hashed_dest = match dest {
                Some(dest) => Some(self.dest.checksum(dest).await?),
                None => None,
            };
            (hashed_source, hashed_dest)
        } else {
            (source.clone(), dest.cloned())
        };

        let operation = decide(&self.config, &source, dest.as_ref());
        let progress = format!(
            "(Checked {}/{} files)",
            self.summary.checked_files(),
            self.summary.total_files()
        );

        match (operation, dest) {
            (Operation::Insert, dest) => {
                let kind = if source.folder() { "folder" } else { "file" };
                let placeholder = match dest {
                    Some(dest) => dest,
                    None => self.dest.placeholder(dest_folder, &source.name(), source.folder()),
                };
                info!("Inserting {} {} {}", kind, placeholder, progress);
                if self.config.dry_run {
                    return Ok(Some(placeholder));
                }
                let inserted = if source.folder() {
                    self.transfer.insert_folder(&source, &placeholder).await?
                } else {
                    self.transfer.insert_file(&source, &placeholder).await?
                };
                Ok(Some(inserted))
            }
            (Operation::Update, Some(dest)) => {
                info!("Updating {} {}", dest, progress);
                if self.config.dry_run {
                    return Ok(Some(dest));
                }
                Ok(Some(self.transfer.update_file(&source, &dest).await?))
            }
            (Operation::Touch, Some(dest)) => {
                info!("Touching {} {}", dest, progress);
                if self.config.dry_run {
                    return Ok(Some(dest));
                }
                Ok(Some(self.transfer.touch(&source, &dest).await?))
            }
            (Operation::Skip(SkipReason::Excluded), _) => {
                debug!("Skipping excluded {} {}", source, progress);
                Ok(None)
            }
            (Operation::Skip(SkipReason::Link), _) => {
                debug!("Skipping link {} {}", source, progress);
                Ok(None)
            }
            (Operation::Skip(SkipReason::TypeMismatch), _) => {
                warn!(
                    "Skipping {}: destination exists with another type {}",
                    source, progress
                );
                Ok(None)
            }
            (Operation::Skip(SkipReason::DestinationNewer), _) => {
                debug!("Skipping {}: destination is newer {}", source, progress);
                Ok(None)
            }
            (Operation::Skip(SkipReason::UpToDate), _) => {
                debug!("Up to date {} {}", source, progress);
                Ok(None)
            }
            (Operation::Update | Operation::Touch, None) => Ok(None),
        }
    }

    async fn recurse(&self, source: &Folder, dest: &Folder) -> Result<()> {
        for child in source.folders() {
            if self.config.filters.is_excluded(child) || self.config.skips_link(child) {
                continue;
            }

            let dest_child = match dest.child(&child.name()) {
                Some(dest_child) => dest_child,
                None => {
                    warn!("Skipping {}: no destination folder", child);
                    continue;
                }
            };
            if !dest_child.folder() {
                warn!("Skipping {}: destination {} is not a folder", child, dest_child);
                continue;
            }

            let dest_folder = if dest_child.exists() {
                self.dest.folder(dest_child).await?
            } else {
                self.dest.empty(dest_child)
            };
            let source_folder = self.source.folder(child).await?;
            self.sync_folder(source_folder, dest_folder).await?;
        }
        Ok(())
    }
}
