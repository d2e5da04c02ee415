//! 本地路径与远程 URL 地址
//!
//! 解析只做语法处理，不访问任何存储

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

pub const REMOTE_SCHEME: &str = "gdrive";
pub const LOCAL_SCHEME: &str = "file";

pub const URL_SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `gdrive://host/path`、`gdrive:///path` 或 `gdrive:/path`
    Remote,
    /// `file:///path`
    LocalUrl,
    /// 本地路径
    LocalPath,
}

/// 目录树条目的不可变地址
#[derive(Debug, Clone)]
pub struct Location {
    scheme: Scheme,
    authority: String,
    /// 原始路径，URL 已做百分号解码，保留末尾分隔符
    raw: String,
    /// 计算相对路径所用基准位置的规范路径
    base: Option<String>,
}

impl Location {
    /// 识别并解析地址，不会失败
    pub fn create(address: &str) -> Self {
        if let Some(rest) = strip_scheme(address, REMOTE_SCHEME) {
            let (authority, raw) = split_url(rest);
            return Self::new(Scheme::Remote, authority, raw);
        }
        if let Some(rest) = strip_scheme(address, LOCAL_SCHEME) {
            let (authority, raw) = split_url(rest);
            return Self::new(Scheme::LocalUrl, authority, raw);
        }

        Self::new(Scheme::LocalPath, String::new(), address.to_string())
    }

    fn new(scheme: Scheme, authority: String, raw: String) -> Self {
        Self {
            scheme,
            authority,
            raw,
            base: None,
        }
    }

    fn with_raw(&self, raw: String) -> Self {
        Self {
            scheme: self.scheme,
            authority: self.authority.clone(),
            raw,
            base: self.base.clone(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn remote(&self) -> bool {
        self.scheme == Scheme::Remote
    }

    fn is_separator(&self, c: char) -> bool {
        c == URL_SEPARATOR || (self.scheme != Scheme::Remote && c == std::path::MAIN_SEPARATOR)
    }

    fn separator(&self) -> char {
        match self.scheme {
            Scheme::LocalPath => std::path::MAIN_SEPARATOR,
            _ => URL_SEPARATOR,
        }
    }

    /// 规范路径：去掉末尾分隔符，根为 `/`
    pub fn path(&self) -> String {
        if self.raw.is_empty() {
            return match self.scheme {
                Scheme::LocalPath => ".".to_string(),
                _ => URL_SEPARATOR.to_string(),
            };
        }

        let trimmed = self.raw.trim_end_matches(|c| self.is_separator(c));
        if trimmed.is_empty() {
            return self.separator().to_string();
        }

        trimmed.to_string()
    }

    /// 基本名称，根为空
    pub fn name(&self) -> String {
        let path = self.path();
        match path.rfind(|c| self.is_separator(c)) {
            Some(idx) => path[idx + 1..].to_string(),
            None if path == "." => String::new(),
            None => path,
        }
    }

    pub fn parent(&self) -> Option<Location> {
        let path = self.path();
        match path.rfind(|c| self.is_separator(c)) {
            Some(0) if path.len() == 1 => None,
            Some(0) => Some(self.with_raw(path[..1].to_string())),
            Some(idx) => {
                let parent = path[..idx].trim_end_matches(|c| self.is_separator(c));
                if parent.is_empty() {
                    Some(self.with_raw(path[..1].to_string()))
                } else {
                    Some(self.with_raw(parent.to_string()))
                }
            }
            None if path == "." => None,
            None => Some(self.with_raw(".".to_string())),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// 地址以分隔符结尾时为 true，表示目录下的条目
    pub fn contents(&self) -> bool {
        self.raw.ends_with(|c| self.is_separator(c))
    }

    pub fn join(&self, name: &str) -> Location {
        let path = self.path();
        let raw = if path.ends_with(|c| self.is_separator(c)) {
            format!("{}{}", path, name)
        } else {
            format!("{}{}{}", path, self.separator(), name)
        };

        self.with_raw(raw)
    }

    /// 将 `base` 设为计算相对路径的根
    pub fn with_base(mut self, base: &Location) -> Location {
        self.base = Some(base.path());
        self
    }

    /// 相对于基准位置的路径，始终以 `/` 分隔并以 `/` 开头
    pub fn relative_path(&self) -> String {
        match &self.base {
            Some(base) => self.strip(base).unwrap_or_else(|| self.normalized(&self.path())),
            None => self.normalized(&self.path()),
        }
    }

    fn strip(&self, base: &str) -> Option<String> {
        let path = self.path();
        let rest = path.strip_prefix(base)?;
        if !(rest.is_empty()
            || rest.starts_with(|c| self.is_separator(c))
            || base.ends_with(|c| self.is_separator(c)))
        {
            return None;
        }
        let rest = rest.trim_start_matches(|c| self.is_separator(c));

        Some(self.normalized(&format!("/{}", rest)))
    }

    fn normalized(&self, path: &str) -> String {
        let path = if self.scheme == Scheme::Remote {
            path.to_string()
        } else {
            path.replace(std::path::MAIN_SEPARATOR, "/")
        };
        if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        }
    }

    /// 本地位置的原生路径
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.path())
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.authority == other.authority
            && self.path() == other.path()
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.authority.hash(state);
        self.path().hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Remote => write!(f, "{}://{}{}", REMOTE_SCHEME, self.authority, self.raw),
            Scheme::LocalUrl => write!(f, "{}://{}{}", LOCAL_SCHEME, self.authority, self.raw),
            Scheme::LocalPath => write!(f, "{}", self.raw),
        }
    }
}

fn strip_scheme<'a>(address: &'a str, scheme: &str) -> Option<&'a str> {
    let head = address.get(..scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }
    address[scheme.len()..].strip_prefix(':')
}

/// 拆分 `//authority/path`（或 `/path`）并对路径做百分号解码
fn split_url(rest: &str) -> (String, String) {
    let (authority, path) = match rest.strip_prefix("//") {
        Some(after) => match after.find(URL_SEPARATOR) {
            Some(idx) => (&after[..idx], &after[idx..]),
            None => (after, ""),
        },
        None => ("", rest),
    };

    let path = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    (authority.to_string(), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(Location::create("gdrive:///a/b").scheme(), Scheme::Remote);
        assert_eq!(Location::create("gdrive:/a/b").scheme(), Scheme::Remote);
        assert_eq!(Location::create("gdrive://host/a").scheme(), Scheme::Remote);
        assert_eq!(Location::create("file:///tmp/x").scheme(), Scheme::LocalUrl);
        assert_eq!(Location::create("/tmp/x").scheme(), Scheme::LocalPath);
        assert_eq!(Location::create("relative/x").scheme(), Scheme::LocalPath);
    }

    #[test]
    fn test_remote_components() {
        let location = Location::create("gdrive://host/folder/sub%20dir/");
        assert_eq!(location.path(), "/folder/sub dir");
        assert_eq!(location.name(), "sub dir");
        assert!(location.contents());
        assert_eq!(location.parent().unwrap().path(), "/folder");
        assert_eq!(location.to_string(), "gdrive://host/folder/sub dir/");
    }

    #[test]
    fn test_root_sentinel() {
        let root = Location::create("gdrive:///");
        assert_eq!(root.path(), "/");
        assert_eq!(root.name(), "");
        assert!(root.contents());
        assert!(root.parent().is_none());
        assert!(root.is_root());

        let empty = Location::create("gdrive://host");
        assert_eq!(empty.path(), "/");
        assert!(!empty.contents());
    }

    #[test]
    fn test_parent_chain() {
        let location = Location::create("gdrive:///a/b/c");
        let parent = location.parent().unwrap();
        assert_eq!(parent.path(), "/a/b");
        let grand = parent.parent().unwrap();
        assert_eq!(grand.path(), "/a");
        let root = grand.parent().unwrap();
        assert_eq!(root.path(), "/");
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_join() {
        let root = Location::create("gdrive:///");
        assert_eq!(root.join("a").path(), "/a");
        assert_eq!(root.join("a").join("ñandú").path(), "/a/ñandú");

        let local = Location::create("/tmp/dir/");
        let child = local.join("x");
        assert_eq!(child.name(), "x");
        assert!(!child.contents());
        assert_eq!(child.parent().unwrap(), Location::create("/tmp/dir"));
    }

    #[test]
    fn test_relative_path() {
        let base = Location::create("gdrive:///src");
        let file = base.join("a").join("b.txt").with_base(&base);
        assert_eq!(file.relative_path(), "/a/b.txt");
        // 共享前缀的同级目录不在基准之下
        let sibling = Location::create("gdrive:///src2/a").with_base(&base);
        assert_eq!(sibling.relative_path(), "/src2/a");

        let root = Location::create("gdrive:///");
        let top = root.join("x").with_base(&root);
        assert_eq!(top.relative_path(), "/x");
    }

    #[test]
    fn test_scheme_inequality() {
        assert_ne!(Location::create("file:///tmp/x"), Location::create("/tmp/x"));
        assert_ne!(Location::create("gdrive:///tmp/x"), Location::create("file:///tmp/x"));
        assert_eq!(Location::create("/tmp/x/"), Location::create("/tmp/x"));
    }
}
