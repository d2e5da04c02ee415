//! 错误类型，引擎、存储与传输后端共用

use thiserror::Error;

/// 同步错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 非创建类操作所需的位置不存在
    #[error("{0} not found")]
    NotFound(String),

    /// 传给存储的位置类型不匹配
    #[error("Wrong location type: {0}")]
    WrongType(String),

    /// 无效的 glob 或正则过滤器
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// 源条目在列举之后、传输之前消失
    #[error("No such file or directory: {0}")]
    SourceNotFound(String),

    /// 远程 API 返回失败状态
    #[error("Remote request failed ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn pattern(pattern: &str, message: impl Into<String>) -> Self {
        SyncError::Pattern {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }

    /// 请求执行器是否可以重试该失败操作
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::NotFound(_)
            | SyncError::WrongType(_)
            | SyncError::Pattern { .. }
            | SyncError::SourceNotFound(_) => false,
            SyncError::Remote { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            SyncError::Io(e) => e.kind() != std::io::ErrorKind::NotFound,
            SyncError::Json(_) => false,
            SyncError::Http(_) | SyncError::Other(_) => true,
        }
    }

    /// 转换读取源条目时的 IO 错误
    pub fn from_source_io(error: std::io::Error, path: &str) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(path.to_string())
        } else {
            SyncError::Io(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(!SyncError::NotFound("/a".into()).is_transient());
        assert!(!SyncError::SourceNotFound("/a".into()).is_transient());
        assert!(!SyncError::pattern("[", "unterminated").is_transient());
        assert!(SyncError::Remote { status: 503, message: String::new() }.is_transient());
        assert!(SyncError::Remote { status: 429, message: String::new() }.is_transient());
        assert!(!SyncError::Remote { status: 403, message: String::new() }.is_transient());
    }

    #[test]
    fn test_source_io_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            SyncError::from_source_io(err, "/x"),
            SyncError::SourceNotFound(_)
        ));
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(SyncError::from_source_io(err, "/x"), SyncError::Io(_)));
    }
}
