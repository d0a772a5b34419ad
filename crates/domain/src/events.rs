//! 房间广播事件的线上格式。
//!
//! 服务端→客户端的四类事件；`type` 标签与字段名沿用既有客户端约定。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::value_objects::{RoomKey, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// 新持久化的聊天消息，字段展平进事件本体。
    Message(Message),

    /// 短暂的输入状态，只进内存不落库。
    #[serde(rename_all = "camelCase")]
    Typing {
        room: RoomKey,
        user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        typing: bool,
    },

    /// 短暂的已读回执；持久化的已读标记走单独的 REST 调用。
    #[serde(rename_all = "camelCase")]
    Read {
        room: RoomKey,
        message_id: Uuid,
        reader_id: UserId,
    },

    /// 用户级在线状态，首个连接上线/最后一个连接下线时各广播一次。
    #[serde(rename_all = "camelCase")]
    Presence { user_id: UserId, online: bool },
}

impl RoomEvent {
    /// 事件的投递范围：`None` 表示面向所有连接（在线状态是用户级的，不分房间）。
    pub fn room_key(&self) -> Option<&RoomKey> {
        match self {
            RoomEvent::Message(message) => Some(&message.room),
            RoomEvent::Typing { room, .. } => Some(room),
            RoomEvent::Read { room, .. } => Some(room),
            RoomEvent::Presence { .. } => None,
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, RoomEvent::Message(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_event_flattens_fields() {
        let event = RoomEvent::Message(Message {
            id: Uuid::nil(),
            room: RoomKey::global(),
            user_id: UserId::new("u1"),
            user_name: None,
            content: "hi".into(),
            attachment: None,
            created_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["room"], "global");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn typing_event_uses_camel_case() {
        let event = RoomEvent::Typing {
            room: RoomKey::global(),
            user_id: UserId::new("u1"),
            user_name: Some("Ada".into()),
            typing: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["userName"], "Ada");
        assert_eq!(json["typing"], true);
    }

    #[test]
    fn presence_has_no_room_scope() {
        let event = RoomEvent::Presence {
            user_id: UserId::new("u1"),
            online: true,
        };
        assert!(event.room_key().is_none());
    }

    #[test]
    fn events_round_trip() {
        let event = RoomEvent::Read {
            room: RoomKey::parse("math").unwrap(),
            message_id: Uuid::new_v4(),
            reader_id: UserId::new("u2"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: RoomEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
