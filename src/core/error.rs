// 错误处理系统
// 统一的错误类型，外部服务错误、配置错误与内部错误都汇总到这里

use std::io;
use thiserror::Error;

use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("文件错误: {0}")]
    Io(#[from] io::Error),

    #[error("解析错误: {0}")]
    Parse(String),

    #[error("外部服务错误: {0}")]
    Service(#[from] ServiceError),

    #[error("内部错误: {0}")]
    Internal(String),
}

// Result类型别名
pub type Result<T> = std::result::Result<T, SpawnError>;

impl From<serde_json::Error> for SpawnError {
    fn from(error: serde_json::Error) -> Self {
        SpawnError::Parse(error.to_string())
    }
}

impl From<toml::de::Error> for SpawnError {
    fn from(error: toml::de::Error) -> Self {
        SpawnError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for SpawnError {
    fn from(error: toml::ser::Error) -> Self {
        SpawnError::Config(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SpawnError {
    // 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SpawnError::Service(ServiceError::MessageGone(_)) => ErrorSeverity::Low,
            SpawnError::Service(_) => ErrorSeverity::Medium,
            SpawnError::Io(_) => ErrorSeverity::Medium,
            SpawnError::Config(_) | SpawnError::Parse(_) => ErrorSeverity::High,
            SpawnError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    // 配置错误只会出现在启动阶段，运行期的错误都不会终止进程
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SpawnError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageHandle;

    #[test]
    fn test_error_display() {
        let error = SpawnError::Config("message_frequency".to_string());
        assert_eq!(error.to_string(), "配置错误: message_frequency");
    }

    #[test]
    fn test_error_severity() {
        let gone = SpawnError::from(ServiceError::MessageGone(MessageHandle(7)));
        assert_eq!(gone.severity(), ErrorSeverity::Low);
        assert!(gone.is_recoverable());

        let internal = SpawnError::Internal("刷新任务崩溃".to_string());
        assert_eq!(internal.severity(), ErrorSeverity::Critical);
        assert!(internal.is_recoverable());

        assert!(!SpawnError::Config("bad".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SpawnError = io_error.into();
        assert!(matches!(error, SpawnError::Io(_)));

        let json_error = serde_json::from_str::<u32>("nope").unwrap_err();
        let error: SpawnError = json_error.into();
        assert!(matches!(error, SpawnError::Parse(_)));
    }
}
