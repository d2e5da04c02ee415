//! 包含/排除过滤器
//!
//! 过滤器按命令行顺序匹配，第一个匹配的决定结果；
//! 没有任何匹配的条目默认包含

pub mod lexer;
pub mod parser;

use crate::core::file::File;
use crate::error::{Result, SyncError};
use regex::Regex;
use std::fmt;

pub use parser::{compile, CompiledPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pattern: String,
    regex: Regex,
    polarity: Polarity,
    folder_only: bool,
}

impl Filter {
    /// 编译 glob 模式
    pub fn glob(pattern: &str, polarity: Polarity) -> Result<Self> {
        let compiled = compile(pattern)?;
        let regex = Regex::new(&compiled.regex)
            .map_err(|e| SyncError::pattern(pattern, e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            polarity,
            folder_only: compiled.folder_only,
        })
    }

    /// 包装原始正则表达式，从相对路径开头匹配
    pub fn regex(expression: &str, polarity: Polarity) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})", expression))
            .map_err(|e| SyncError::pattern(expression, e.to_string()))?;
        Ok(Self {
            pattern: expression.to_string(),
            regex,
            polarity,
            folder_only: false,
        })
    }

    pub fn include(pattern: &str) -> Result<Self> {
        Self::glob(pattern, Polarity::Include)
    }

    pub fn exclude(pattern: &str) -> Result<Self> {
        Self::glob(pattern, Polarity::Exclude)
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn folder_only(&self) -> bool {
        self.folder_only
    }

    /// 匹配 `file` 时返回该过滤器的极性
    pub fn check(&self, file: &File) -> Option<Polarity> {
        if self.folder_only && !file.folder() {
            return None;
        }
        self.regex
            .is_match(&file.location().relative_path())
            .then_some(self.polarity)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.polarity {
            Polarity::Include => '+',
            Polarity::Exclude => '-',
        };
        write!(f, "{} {}", sign, self.pattern)
    }
}

/// 有序过滤器列表
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn is_excluded(&self, file: &File) -> bool {
        is_excluded(&self.filters, file)
    }
}

/// 第一个匹配的过滤器生效，无匹配则包含
pub fn is_excluded(filters: &[Filter], file: &File) -> bool {
    filters
        .iter()
        .find_map(|f| f.check(file))
        .map_or(false, |p| p == Polarity::Exclude)
}
