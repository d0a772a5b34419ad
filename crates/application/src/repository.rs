use async_trait::async_trait;
use domain::{Message, NewMessage, ReadMarker, RepositoryError, RoomKey, Timestamp, UserId};

/// 消息存储接口。
///
/// 写入顺序即广播顺序：`append` 成功返回之前，消息不会进入任何投递路径。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化一条消息，由存储分配 id 和创建时间。
    async fn append(&self, draft: NewMessage) -> Result<Message, RepositoryError>;

    /// 房间历史的尾部：最近 `limit` 条，按从旧到新返回。
    async fn list_recent(&self, room: &RoomKey, limit: u32) -> Result<Vec<Message>, RepositoryError>;

    /// `since` 之后、且不是 `user_id` 本人发的消息条数。
    async fn count_unread(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        since: Timestamp,
    ) -> Result<i64, RepositoryError>;
}

/// 已读标记存储接口。
#[async_trait]
pub trait ReadMarkerRepository: Send + Sync {
    /// upsert；已有标记不会向后移动。返回生效的标记时间。
    async fn mark_read(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        at: Timestamp,
    ) -> Result<Timestamp, RepositoryError>;

    async fn get(
        &self,
        room: &RoomKey,
        user_id: &UserId,
    ) -> Result<Option<ReadMarker>, RepositoryError>;
}
