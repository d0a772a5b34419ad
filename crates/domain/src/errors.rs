//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 消息既没有文本内容也没有附件。
    #[error("message has no content and no attachment")]
    EmptyMessage,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误类型
///
/// `Storage` 覆盖后端不可达/写入失败——对一次发送而言是致命的，
/// 调用方必须向发送者上报失败，绝不能静默丢弃。
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    Conflict,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
