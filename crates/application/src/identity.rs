use async_trait::async_trait;
use domain::UserId;
use thiserror::Error;

/// 经过校验的身份声明。
///
/// 凭证由外部身份服务签发，本子系统只校验、不签发。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, name: Option<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name,
            email,
        }
    }

    /// 消息快照里的显示名：优先姓名，其次邮箱。
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| self.email.clone())
    }
}

/// 身份校验错误。
///
/// 缺失/格式错误/过期对调用方不可区分，避免泄露凭证状态；
/// 具体原因由实现方在内部日志中记录。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// 校验不透明凭证，成功时返回可信的身份三元组。
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}
