use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Attachment, Message, NewMessage, ReadMarker, RepositoryError, RoomKey, UserId};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

use application::{MessageRepository, ReadMarkerRepository};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room: String,
    user_id: String,
    user_name: Option<String>,
    content: String,
    attachment: Option<Json<Attachment>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let room = RoomKey::parse(value.room).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: value.id,
            room,
            user_id: UserId::new(value.user_id),
            user_name: value.user_name,
            content: value.content,
            attachment: value.attachment.map(|Json(attachment)| attachment),
            created_at: value.created_at,
        })
    }
}

/// PostgreSQL 消息仓储。
///
/// 追加即插入，创建时间由数据库分配，保证房间内的广播顺序与写入顺序一致。
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, draft: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, room, user_id, user_name, content, attachment)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, room, user_id, user_name, content, attachment, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.room.as_str())
        .bind(draft.user_id.as_str())
        .bind(&draft.user_name)
        .bind(&draft.content)
        .bind(draft.attachment.map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.try_into()
    }

    async fn list_recent(
        &self,
        room: &RoomKey,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room, user_id, user_name, content, attachment, created_at
            FROM messages
            WHERE room = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(room.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // 从旧到新返回尾部
        let mut messages = records
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn count_unread(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE room = $1 AND created_at > $2 AND user_id <> $3
            "#,
        )
        .bind(room.as_str())
        .bind(since)
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count)
    }
}

/// PostgreSQL 已读标记仓储。
///
/// 单调性由存储保证：upsert 时取既有值与新值中的较大者。
pub struct PgReadMarkerRepository {
    pool: PgPool,
}

impl PgReadMarkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadMarkerRepository for PgReadMarkerRepository {
    async fn mark_read(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let effective: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO read_markers (room, user_id, last_read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room, user_id)
            DO UPDATE SET last_read_at = GREATEST(read_markers.last_read_at, EXCLUDED.last_read_at)
            RETURNING last_read_at
            "#,
        )
        .bind(room.as_str())
        .bind(user_id.as_str())
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(effective)
    }

    async fn get(
        &self,
        room: &RoomKey,
        user_id: &UserId,
    ) -> Result<Option<ReadMarker>, RepositoryError> {
        let last_read_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT last_read_at FROM read_markers
            WHERE room = $1 AND user_id = $2
            "#,
        )
        .bind(room.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(last_read_at.map(|at| ReadMarker::new(room.clone(), user_id.clone(), at)))
    }
}
