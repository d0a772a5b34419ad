//! 用户级在线状态。
//!
//! 一个用户在任意进程有 ≥1 条活跃连接即在线。本进程内用引用计数判断
//! 首连/末断的转变，跨进程通过总线上的 presence 事件最终一致。

use std::collections::HashMap;
use std::sync::Mutex;

use domain::UserId;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    connections: Mutex<HashMap<UserId, usize>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条连接；该用户首条连接时返回 true（需要广播上线）。
    pub fn connect(&self, user_id: &UserId) -> bool {
        let mut connections = self.connections.lock().expect("presence lock poisoned");
        let count = connections.entry(user_id.clone()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// 移除一条连接；该用户最后一条连接断开时返回 true（需要广播下线）。
    pub fn disconnect(&self, user_id: &UserId) -> bool {
        let mut connections = self.connections.lock().expect("presence lock poisoned");
        match connections.get_mut(user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                connections.remove(user_id);
                true
            }
            None => false,
        }
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.connections
            .lock()
            .expect("presence lock poisoned")
            .contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.connections.lock().expect("presence lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connection_reports_online_transition() {
        let presence = PresenceTracker::new();
        let user = UserId::new("u1");

        assert!(presence.connect(&user));
        assert!(!presence.connect(&user));
        assert!(presence.is_online(&user));
    }

    #[test]
    fn only_last_disconnect_reports_offline() {
        let presence = PresenceTracker::new();
        let user = UserId::new("u1");
        presence.connect(&user);
        presence.connect(&user);

        assert!(!presence.disconnect(&user));
        assert!(presence.is_online(&user));
        assert!(presence.disconnect(&user));
        assert!(!presence.is_online(&user));
    }

    #[test]
    fn disconnect_without_connection_is_harmless() {
        let presence = PresenceTracker::new();
        assert!(!presence.disconnect(&UserId::new("ghost")));
    }
}
