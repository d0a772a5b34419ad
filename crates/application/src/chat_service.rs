//! 聊天用例服务。
//!
//! 网关（WebSocket）和 REST 接口共用这一层：同一条发送路径、同一套
//! 限流与持久化顺序。不变量：消息先落库、后广播，任何投递路径都
//! 观察不到未持久化的消息。

use std::sync::Arc;

use domain::{
    Attachment, ConnectionId, Message, NewMessage, RepositoryError, RoomEvent, RoomKey, Timestamp,
    UserId,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::bus::FanoutBus;
use crate::clock::Clock;
use crate::error::SendError;
use crate::identity::Identity;
use crate::presence::PresenceTracker;
use crate::rate_limiter::{RateAction, RateLimiter, RateLimits};
use crate::registry::{ConnectionRegistry, RoomTap};
use crate::repository::{MessageRepository, ReadMarkerRepository};

/// 历史查询的默认与上限条数。
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
pub const MAX_HISTORY_LIMIT: u32 = 200;

pub struct ChatServiceDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub read_markers: Arc<dyn ReadMarkerRepository>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub bus: Arc<FanoutBus>,
    pub limits: RateLimits,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

/// 网关持有的一条已登记连接：事件接收端 + 连接 id。
pub struct GatewayConnection {
    pub id: ConnectionId,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

/// `GET /unread` 的结果。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub room: RoomKey,
    pub unread: i64,
    pub last_read_at: Timestamp,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 登记一条新的双向连接：自动加入 `"global"`，该用户首条连接时
    /// 广播上线。
    pub async fn connect(&self, identity: &Identity) -> GatewayConnection {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.deps.registry.register(id, tx);
        self.deps.registry.join(id, RoomKey::global());

        tracing::info!(connection_id = %id, user_id = %identity.user_id, "连接已登记");

        if self.deps.presence.connect(&identity.user_id) {
            self.deps
                .bus
                .publish(RoomEvent::Presence {
                    user_id: identity.user_id.clone(),
                    online: true,
                })
                .await;
        }
        GatewayConnection { id, events: rx }
    }

    /// 注销连接；该用户最后一条连接断开时广播下线。
    pub async fn disconnect(&self, connection: ConnectionId, user_id: &UserId) {
        self.deps.registry.unregister(connection);
        tracing::info!(connection_id = %connection, user_id = %user_id, "连接已注销");

        if self.deps.presence.disconnect(user_id) {
            self.deps
                .bus
                .publish(RoomEvent::Presence {
                    user_id: user_id.clone(),
                    online: false,
                })
                .await;
        }
    }

    /// 加入房间。只回执给调用方，不产生广播。
    pub fn join(&self, connection: ConnectionId, room: RoomKey) -> bool {
        self.deps.registry.join(connection, room)
    }

    pub fn leave(&self, connection: ConnectionId, room: &RoomKey) -> bool {
        self.deps.registry.leave(connection, room)
    }

    /// 发送一条消息：校验 → 限流 → 落库 → 广播（发送者也收到）。
    ///
    /// 广播只在 `append` 成功返回之后发生；存储失败对发送者是显式
    /// 错误，消息不会出现在任何接收端。
    pub async fn send(
        &self,
        author: &Identity,
        room: RoomKey,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<Message, SendError> {
        let draft = NewMessage::compose(
            room,
            author.user_id.clone(),
            author.display_name(),
            content,
            attachment,
        )
        .map_err(|_| SendError::Empty)?;

        let rule = self.deps.limits.message;
        if !self
            .deps
            .rate_limiter
            .allow(&author.user_id, RateAction::Message, rule.limit, rule.window)
            .await
        {
            return Err(SendError::RateLimited);
        }

        let message = self.deps.messages.append(draft).await.map_err(|err| {
            tracing::error!(error = %err, user_id = %author.user_id, "message append failed");
            SendError::Store(err)
        })?;

        self.deps
            .bus
            .publish(RoomEvent::Message(message.clone()))
            .await;
        Ok(message)
    }

    /// 输入状态：限流拒绝时静默丢弃，放行时广播给房间内除发送者外的成员。
    pub async fn typing(
        &self,
        connection: ConnectionId,
        author: &Identity,
        room: RoomKey,
        typing: bool,
    ) {
        let rule = self.deps.limits.typing;
        if !self
            .deps
            .rate_limiter
            .allow(&author.user_id, RateAction::Typing, rule.limit, rule.window)
            .await
        {
            return;
        }
        self.deps
            .bus
            .publish_excluding(
                RoomEvent::Typing {
                    room,
                    user_id: author.user_id.clone(),
                    user_name: author.display_name(),
                    typing,
                },
                Some(connection),
            )
            .await;
    }

    /// 短暂的已读回执广播（含发送者，接收端自行过滤自己的 id）。
    /// 持久已读标记由 `mark_read` 单独推进。
    pub async fn read_receipt(&self, reader: &UserId, room: RoomKey, message_id: uuid::Uuid) {
        self.deps
            .bus
            .publish(RoomEvent::Read {
                room,
                message_id,
                reader_id: reader.clone(),
            })
            .await;
    }

    /// 房间历史尾部，从旧到新。
    pub async fn history(
        &self,
        room: &RoomKey,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.deps.messages.list_recent(room, limit).await
    }

    pub async fn unread(
        &self,
        room: &RoomKey,
        user_id: &UserId,
    ) -> Result<UnreadSummary, RepositoryError> {
        let marker = self.deps.read_markers.get(room, user_id).await?;
        let last_read_at = marker
            .map(|m| m.last_read_at)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
        let unread = self
            .deps
            .messages
            .count_unread(room, user_id, last_read_at)
            .await?;
        Ok(UnreadSummary {
            room: room.clone(),
            unread,
            last_read_at,
        })
    }

    /// 将已读标记推进到当前时刻，返回生效的时间戳。
    pub async fn mark_read(
        &self,
        room: &RoomKey,
        user_id: &UserId,
    ) -> Result<Timestamp, RepositoryError> {
        let now = self.deps.clock.now();
        self.deps.read_markers.mark_read(room, user_id, now).await
    }

    /// 服务端推送回退通道的只读接入：仅该房间、仅 message 事件的消费方使用。
    pub fn open_stream(&self, room: RoomKey) -> RoomTap {
        self.deps.registry.tap(room)
    }
}
