use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeeperError>;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("连接失败: {0}")]
    Connection(String),

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("配置输出不完整: 仅 {lines} 行有效内容，至少需要 {required} 行")]
    IncompleteOutput { lines: usize, required: usize },

    #[error("数据格式错误: {0}")]
    Data(String),

    #[error("设备索引无效: {index}（当前共 {len} 台设备）")]
    Index { index: usize, len: usize },

    #[error("设备不存在: {0}")]
    DeviceNotFound(String),

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("输入校验失败: {0}")]
    Validation(String),

    #[error("非法的文件路径: {0}")]
    InvalidPath(String),

    #[error("文件不存在: {0}")]
    NotFound(String),

    #[error("计划任务不存在: {0}")]
    ScheduleNotFound(String),

    #[error("加解密失败: {0}")]
    Crypto(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

/// 备份结果中对外暴露的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConnectionError,
    AuthError,
    IncompleteOutputError,
    DataError,
    IndexError,
    BackupError,
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::IncompleteOutputError => "IncompleteOutputError",
            ErrorKind::DataError => "DataError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::BackupError => "BackupError",
            ErrorKind::UnexpectedError => "UnexpectedError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KeeperError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// 映射到备份结果使用的错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeeperError::Connection(_) => ErrorKind::ConnectionError,
            KeeperError::Auth(_) => ErrorKind::AuthError,
            KeeperError::IncompleteOutput { .. } => ErrorKind::IncompleteOutputError,
            KeeperError::Data(_) | KeeperError::Serde(_) => ErrorKind::DataError,
            KeeperError::Index { .. } | KeeperError::DeviceNotFound(_) => ErrorKind::IndexError,
            KeeperError::Backup(_) => ErrorKind::BackupError,
            _ => ErrorKind::UnexpectedError,
        }
    }
}
