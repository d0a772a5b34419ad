use std::collections::{HashMap, HashSet};

use domain::{Message, RoomEvent, RoomKey, UserId};
use uuid::Uuid;

/// 尚未被服务端确认的乐观回显。
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub local_id: Uuid,
    pub user_id: UserId,
    pub content: String,
}

/// 单个房间的聊天视图状态。
///
/// 按消息 id 归约：服务端广播覆盖乐观回显，重复投递（至少一次语义）
/// 不会产生重复条目。
#[derive(Debug)]
pub struct ChatFeed {
    room: RoomKey,
    messages: Vec<Message>,
    seen: HashSet<Uuid>,
    pending: Vec<PendingMessage>,
    typing: HashSet<UserId>,
    online: HashSet<UserId>,
    receipts: HashMap<Uuid, HashSet<UserId>>,
}

impl ChatFeed {
    pub fn new(room: RoomKey) -> Self {
        Self {
            room,
            messages: Vec::new(),
            seen: HashSet::new(),
            pending: Vec::new(),
            typing: HashSet::new(),
            online: HashSet::new(),
            receipts: HashMap::new(),
        }
    }

    /// 预填历史（`GET /messages` 的结果，从旧到新）。
    pub fn load_history(&mut self, history: Vec<Message>) {
        for message in history {
            self.insert_message(message);
        }
    }

    /// 发送前登记乐观回显；服务端副本到达时被替换。
    pub fn push_local(&mut self, local_id: Uuid, user_id: UserId, content: impl Into<String>) {
        self.pending.push(PendingMessage {
            local_id,
            user_id,
            content: content.into(),
        });
    }

    /// 发送失败时撤掉对应的乐观回显。
    pub fn drop_local(&mut self, local_id: Uuid) {
        self.pending.retain(|pending| pending.local_id != local_id);
    }

    /// 归约一条服务端事件。其他房间的事件被忽略（presence 除外，它是用户级的）。
    pub fn apply(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Message(message) => {
                if message.room != self.room {
                    return;
                }
                // 服务端副本到达：同作者同内容的乐观回显完成了一次往返
                if let Some(position) = self
                    .pending
                    .iter()
                    .position(|p| p.user_id == message.user_id && p.content == message.content)
                {
                    self.pending.remove(position);
                }
                self.insert_message(message);
            }
            RoomEvent::Typing {
                room,
                user_id,
                typing,
                ..
            } => {
                if room != self.room {
                    return;
                }
                if typing {
                    self.typing.insert(user_id);
                } else {
                    self.typing.remove(&user_id);
                }
            }
            RoomEvent::Read {
                room,
                message_id,
                reader_id,
            } => {
                if room != self.room {
                    return;
                }
                self.receipts.entry(message_id).or_default().insert(reader_id);
            }
            RoomEvent::Presence { user_id, online } => {
                if online {
                    self.online.insert(user_id);
                } else {
                    self.online.remove(&user_id);
                    // 下线的用户不再处于输入状态
                    self.typing.remove(&user_id);
                }
            }
        }
    }

    fn insert_message(&mut self, message: Message) {
        if !self.seen.insert(message.id) {
            return;
        }
        // 历史与实时流都按时间就位
        let position = self
            .messages
            .iter()
            .rposition(|existing| existing.created_at <= message.created_at)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.messages.insert(position, message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    pub fn typing_users(&self) -> &HashSet<UserId> {
        &self.typing
    }

    pub fn online_users(&self) -> &HashSet<UserId> {
        &self.online
    }

    pub fn readers_of(&self, message_id: Uuid) -> usize {
        self.receipts
            .get(&message_id)
            .map(|readers| readers.len())
            .unwrap_or(0)
    }
}
