use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 用户唯一标识。
///
/// 由外部身份服务签发，对本子系统而言是不透明字符串。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// 房间键。
///
/// 房间没有独立实体，键本身就是作用域；`"global"` 是每个连接的默认房间。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey(String);

pub const GLOBAL_ROOM: &str = "global";

impl RoomKey {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("room", "cannot be empty"));
        }
        if value.len() > 128 {
            return Err(DomainError::invalid_argument("room", "too long"));
        }
        Ok(Self(value))
    }

    /// 解析可省略的房间键，省略时回落到 `"global"`。
    pub fn or_global(value: Option<String>) -> Result<Self, DomainError> {
        match value {
            Some(room) if !room.trim().is_empty() => Self::parse(room),
            _ => Ok(Self::global()),
        }
    }

    pub fn global() -> Self {
        Self(GLOBAL_ROOM.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for RoomKey {
    fn default() -> Self {
        Self::global()
    }
}

/// 连接唯一标识。
///
/// 仅存在于网关进程内，连接断开即销毁，从不持久化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_key_rejects_empty() {
        assert!(RoomKey::parse("").is_err());
        assert!(RoomKey::parse("   ").is_err());
    }

    #[test]
    fn room_key_trims() {
        let key = RoomKey::parse("  cohort-7  ").unwrap();
        assert_eq!(key.as_str(), "cohort-7");
    }

    #[test]
    fn missing_room_falls_back_to_global() {
        assert_eq!(RoomKey::or_global(None).unwrap().as_str(), GLOBAL_ROOM);
        assert_eq!(
            RoomKey::or_global(Some("  ".into())).unwrap().as_str(),
            GLOBAL_ROOM
        );
        assert_eq!(
            RoomKey::or_global(Some("math".into())).unwrap().as_str(),
            "math"
        );
    }
}
