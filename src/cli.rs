//! 命令行参数

use crate::core::engine::SyncConfig;
use crate::error::Result;
use crate::filter::{Filter, FilterChain, Polarity};
use crate::location::Location;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Exclude,
    Include,
    RegexExclude,
    RegexInclude,
}

impl FilterKind {
    /// 各过滤选项的参数 id 与类型
    const OPTIONS: [(&'static str, FilterKind); 4] = [
        ("exclude", FilterKind::Exclude),
        ("include", FilterKind::Include),
        ("rexclude", FilterKind::RegexExclude),
        ("rinclude", FilterKind::RegexInclude),
    ];

    fn compile(self, pattern: &str) -> Result<Filter> {
        match self {
            FilterKind::Exclude => Filter::glob(pattern, Polarity::Exclude),
            FilterKind::Include => Filter::glob(pattern, Polarity::Include),
            FilterKind::RegexExclude => Filter::regex(pattern, Polarity::Exclude),
            FilterKind::RegexInclude => Filter::regex(pattern, Polarity::Include),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "drivesync", version)]
#[command(about = "One-way synchronization between local folders and a remote drive", long_about = None)]
pub struct Cli {
    /// 比较内容哈希，而不仅是大小和时间
    #[arg(short, long)]
    pub checksum: bool,

    /// 跳过目标中更新的文件
    #[arg(short, long)]
    pub update: bool,

    /// 将重复、多余及类型不同的目标条目移入回收站
    #[arg(long)]
    pub delete: bool,

    /// 同时回收源被排除的目标条目
    #[arg(long)]
    pub delete_excluded: bool,

    /// 跟随符号链接而不是跳过
    #[arg(short = 'L', long)]
    pub copy_links: bool,

    /// 只显示将要执行的操作，不做任何修改
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// 递归进入子目录
    #[arg(short, long)]
    pub recursive: bool,

    /// 更多输出（-v info，-vv debug）
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// 配置文件
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 排除匹配 glob 模式的条目
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// 包含匹配 glob 模式的条目
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// 排除匹配正则表达式的条目
    #[arg(long, value_name = "REGEX")]
    pub rexclude: Vec<String>,

    /// 包含匹配正则表达式的条目
    #[arg(long, value_name = "REGEX")]
    pub rinclude: Vec<String>,

    /// 源地址，以分隔符结尾表示同步目录下的内容
    #[arg(value_name = "SOURCE", required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// 目标目录
    #[arg(value_name = "DEST", required = true)]
    pub dest: String,

    /// 按命令行顺序排列的过滤选项
    #[arg(skip)]
    filter_args: Vec<(FilterKind, String)>,
}

impl Cli {
    /// 解析 `args`，保留过滤选项的相对顺序
    pub fn parse_ordered<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        cli.filter_args = ordered_filters(&matches);
        Ok(cli)
    }

    pub fn filter_args(&self) -> &[(FilterKind, String)] {
        &self.filter_args
    }

    /// 编译过滤器链，无效模式在遍历目录树之前
    /// 就在这里报错
    pub fn filters(&self) -> Result<FilterChain> {
        let mut chain = FilterChain::default();
        for (kind, pattern) in &self.filter_args {
            chain.push(kind.compile(pattern)?);
        }
        Ok(chain)
    }

    pub fn sync_config(&self) -> Result<SyncConfig> {
        Ok(SyncConfig {
            checksum: self.checksum,
            update: self.update,
            delete: self.delete,
            delete_excluded: self.delete_excluded,
            copy_links: self.copy_links,
            dry_run: self.dry_run,
            recursive: self.recursive,
            filters: self.filters()?,
        })
    }

    pub fn source_locations(&self) -> Vec<Location> {
        self.sources.iter().map(|s| Location::create(s)).collect()
    }

    pub fn dest_location(&self) -> Location {
        Location::create(&self.dest)
    }
}

fn ordered_filters(matches: &ArgMatches) -> Vec<(FilterKind, String)> {
    let mut ordered = Vec::new();
    for (id, kind) in FilterKind::OPTIONS {
        if let (Some(indices), Some(values)) =
            (matches.indices_of(id), matches.get_many::<String>(id))
        {
            ordered.extend(indices.zip(values).map(|(i, v)| (i, kind, v.clone())));
        }
    }
    ordered.sort_by_key(|(index, _, _)| *index);
    ordered.into_iter().map(|(_, kind, v)| (kind, v)).collect()
}
