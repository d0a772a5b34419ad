//! 聊天子系统核心领域模型
//!
//! 包含消息、已读标记等核心实体，房间/用户/连接标识，以及广播事件的线上格式。

pub mod errors;
pub mod events;
pub mod message;
pub mod read_marker;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::RoomEvent;
pub use message::{Attachment, Message, NewMessage};
pub use read_marker::ReadMarker;
pub use value_objects::{ConnectionId, RoomKey, Timestamp, UserId};
