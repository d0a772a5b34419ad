use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::{RoomKey, Timestamp, UserId};

/// 上传服务返回的附件描述符。
///
/// 上传本身由外部服务完成，本子系统只保存并转发描述符。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
}

/// 一条已持久化的聊天消息。创建后不可变。
///
/// `user_name` 在发送时冗余快照，之后不再回查；`created_at` 由存储分配。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room: RoomKey,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub created_at: Timestamp,
}

/// 等待持久化的消息草稿。
///
/// id 和时间戳由存储分配，因此草稿里没有它们。
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub room: RoomKey,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// 组装草稿：裁剪正文空白；正文为空且无附件时拒绝。
    pub fn compose(
        room: RoomKey,
        user_id: UserId,
        user_name: Option<String>,
        content: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Result<Self, DomainError> {
        let content = content.into().trim().to_owned();
        if content.is_empty() && attachment.is_none() {
            return Err(DomainError::EmptyMessage);
        }
        Ok(Self {
            room,
            user_id,
            user_name,
            content,
            attachment,
        })
    }
}
