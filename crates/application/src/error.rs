//! 应用层错误定义。

use domain::RepositoryError;
use thiserror::Error;

/// 一次发送操作的失败原因。
///
/// 每个变体都只上报给发送者本人，绝不广播；存储失败时消息从
/// 发送者视角丢失（安全失败，不会部分广播也不会重复）。
#[derive(Debug, Error)]
pub enum SendError {
    /// 正文为空且没有附件。
    #[error("message is empty")]
    Empty,

    /// 发送频率超出限额。
    #[error("rate limited")]
    RateLimited,

    /// 持久化失败，消息未广播。
    #[error("store failure: {0}")]
    Store(#[from] RepositoryError),
}

impl SendError {
    /// 回执给客户端的错误码，沿用既有线上约定。
    pub fn wire_code(&self) -> &'static str {
        match self {
            SendError::Empty => "empty",
            SendError::RateLimited => "rate_limited",
            SendError::Store(_) => "server_error",
        }
    }
}
