use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomKey, Timestamp, UserId};

/// 每个 (房间, 用户) 一条的持久已读标记。
///
/// 只会向前推进：更早的时间戳不会覆盖已有标记。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMarker {
    pub room: RoomKey,
    pub user_id: UserId,
    pub last_read_at: Timestamp,
}

impl ReadMarker {
    pub fn new(room: RoomKey, user_id: UserId, last_read_at: Timestamp) -> Self {
        Self {
            room,
            user_id,
            last_read_at,
        }
    }

    /// 单调推进标记，返回生效的时间戳。
    pub fn advanced(&mut self, at: Timestamp) -> Timestamp {
        if at > self.last_read_at {
            self.last_read_at = at;
        }
        self.last_read_at
    }
}
