//! 进程内存储实现，服务于测试和单机开发部署。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{Message, NewMessage, ReadMarker, RepositoryError, RoomKey, Timestamp, UserId};
use uuid::Uuid;

use crate::repository::{MessageRepository, ReadMarkerRepository};

#[derive(Debug, Default)]
pub struct MemoryMessageRepository {
    messages: Mutex<Vec<Message>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("message store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn append(&self, draft: NewMessage) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.lock().expect("message store lock");
        let mut created_at = chrono::Utc::now();
        // 与真实存储一致：房间内时间戳单调
        if let Some(last) = messages.iter().rev().find(|m| m.room == draft.room) {
            if created_at <= last.created_at {
                created_at = last.created_at + chrono::Duration::microseconds(1);
            }
        }
        let message = Message {
            id: Uuid::new_v4(),
            room: draft.room,
            user_id: draft.user_id,
            user_name: draft.user_name,
            content: draft.content,
            attachment: draft.attachment,
            created_at,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_recent(&self, room: &RoomKey, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().expect("message store lock");
        let in_room: Vec<Message> = messages.iter().filter(|m| &m.room == room).cloned().collect();
        let skip = in_room.len().saturating_sub(limit as usize);
        Ok(in_room.into_iter().skip(skip).collect())
    }

    async fn count_unread(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        since: Timestamp,
    ) -> Result<i64, RepositoryError> {
        let messages = self.messages.lock().expect("message store lock");
        Ok(messages
            .iter()
            .filter(|m| &m.room == room && m.created_at > since && &m.user_id != user_id)
            .count() as i64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryReadMarkerRepository {
    markers: Mutex<HashMap<(RoomKey, UserId), Timestamp>>,
}

impl MemoryReadMarkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadMarkerRepository for MemoryReadMarkerRepository {
    async fn mark_read(
        &self,
        room: &RoomKey,
        user_id: &UserId,
        at: Timestamp,
    ) -> Result<Timestamp, RepositoryError> {
        let mut markers = self.markers.lock().expect("read marker lock");
        let entry = markers
            .entry((room.clone(), user_id.clone()))
            .or_insert(at);
        if at > *entry {
            *entry = at;
        }
        Ok(*entry)
    }

    async fn get(
        &self,
        room: &RoomKey,
        user_id: &UserId,
    ) -> Result<Option<ReadMarker>, RepositoryError> {
        let markers = self.markers.lock().expect("read marker lock");
        Ok(markers
            .get(&(room.clone(), user_id.clone()))
            .map(|at| ReadMarker::new(room.clone(), user_id.clone(), *at)))
    }
}
