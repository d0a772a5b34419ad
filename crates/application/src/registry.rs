//! 进程内连接登记簿。
//!
//! 连接表 + 房间键→连接集合的索引（避免连接/房间对象互相持有引用）。
//! 本进程的所有投递都走 `deliver` 这一条路径——无论事件产生于本进程
//! 还是经代理转发而来。

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use domain::{ConnectionId, RoomEvent, RoomKey};
use tokio::sync::mpsc;

use crate::bus::EventEnvelope;

struct Registered {
    sender: mpsc::UnboundedSender<RoomEvent>,
    rooms: HashSet<RoomKey>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Registered>,
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
}

/// 连接登记簿。锁内只做内存操作，持锁期间不 await。
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnectionId, sender: mpsc::UnboundedSender<RoomEvent>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.connections.insert(
            id,
            Registered {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// 注销连接并将其从所有已加入的房间移除。
    pub fn unregister(&self, id: ConnectionId) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(registered) = inner.connections.remove(&id) {
            for room in registered.rooms {
                let now_empty = match inner.rooms.get_mut(&room) {
                    Some(members) => {
                        members.remove(&id);
                        members.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    inner.rooms.remove(&room);
                }
            }
        }
    }

    /// 幂等加入；未注册的连接返回 false。
    pub fn join(&self, id: ConnectionId, room: RoomKey) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.connections.contains_key(&id) {
            return false;
        }
        inner.rooms.entry(room.clone()).or_default().insert(id);
        if let Some(registered) = inner.connections.get_mut(&id) {
            registered.rooms.insert(room);
        }
        true
    }

    /// 幂等离开；未注册的连接返回 false。
    pub fn leave(&self, id: ConnectionId, room: &RoomKey) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.connections.contains_key(&id) {
            return false;
        }
        let now_empty = match inner.rooms.get_mut(room) {
            Some(members) => {
                members.remove(&id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.rooms.remove(room);
        }
        if let Some(registered) = inner.connections.get_mut(&id) {
            registered.rooms.remove(room);
        }
        true
    }

    /// 将事件投递给本进程的目标连接。
    ///
    /// 房间事件发给房间成员，在线状态事件发给所有连接；
    /// `exclude` 里的连接（输入状态的发送者）被跳过。
    /// 发送失败说明接收端已退出，随后的注销流程会清理它。
    pub fn deliver(&self, envelope: &EventEnvelope) {
        let inner = self.inner.read().expect("registry lock poisoned");
        let targets: Vec<&Registered> = match envelope.event.room_key() {
            Some(room) => match inner.rooms.get(room) {
                Some(members) => members
                    .iter()
                    .filter(|id| Some(**id) != envelope.exclude)
                    .filter_map(|id| inner.connections.get(id))
                    .collect(),
                None => return,
            },
            None => inner
                .connections
                .iter()
                .filter(|(id, _)| Some(**id) != envelope.exclude)
                .map(|(_, registered)| registered)
                .collect(),
        };
        for registered in targets {
            let _ = registered.sender.send(envelope.event.clone());
        }
    }

    /// 只读接入一个房间的事件流（服务端推送回退通道用）。
    ///
    /// 不产生在线状态，也不自动加入 `"global"`；随 `RoomTap` 一起销毁。
    pub fn tap(self: &Arc<Self>, room: RoomKey) -> RoomTap {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(id, tx);
        self.join(id, room);
        RoomTap {
            id,
            registry: Arc::clone(self),
            rx,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").connections.len()
    }

    pub fn room_size(&self, room: &RoomKey) -> usize {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .rooms
            .get(room)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}

/// 登记簿上的只读房间事件流。
pub struct RoomTap {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
}

impl RoomTap {
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.rx.recv().await
    }
}

impl tokio_stream::Stream for RoomTap {
    type Item = RoomEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for RoomTap {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::UserId;

    fn envelope(event: RoomEvent, exclude: Option<ConnectionId>) -> EventEnvelope {
        EventEnvelope { event, exclude }
    }

    fn typing(room: &RoomKey, user: &str) -> RoomEvent {
        RoomEvent::Typing {
            room: room.clone(),
            user_id: UserId::new(user),
            user_name: None,
            typing: true,
        }
    }

    fn connect(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<RoomEvent>) {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, tx);
        (id, rx)
    }

    #[test]
    fn delivers_to_room_members_only() {
        let registry = ConnectionRegistry::new();
        let room = RoomKey::parse("math").unwrap();
        let (a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);
        registry.join(a, room.clone());

        registry.deliver(&envelope(typing(&room, "u1"), None));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn exclude_skips_the_sender() {
        let registry = ConnectionRegistry::new();
        let room = RoomKey::global();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        registry.join(a, room.clone());
        registry.join(b, room.clone());

        registry.deliver(&envelope(typing(&room, "u1"), Some(a)));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn presence_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);

        let event = RoomEvent::Presence {
            user_id: UserId::new("u1"),
            online: true,
        };
        registry.deliver(&envelope(event, None));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let room = RoomKey::global();
        let (a, _rx) = connect(&registry);

        assert!(registry.join(a, room.clone()));
        assert!(registry.join(a, room.clone()));
        assert_eq!(registry.room_size(&room), 1);

        assert!(registry.leave(a, &room));
        assert!(registry.leave(a, &room));
        assert_eq!(registry.room_size(&room), 0);
    }

    #[test]
    fn unregister_removes_room_membership() {
        let registry = ConnectionRegistry::new();
        let room = RoomKey::global();
        let (a, _rx) = connect(&registry);
        registry.join(a, room.clone());

        registry.unregister(a);
        assert_eq!(registry.room_size(&room), 0);
        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.join(a, room));
    }

    #[tokio::test]
    async fn tap_receives_room_events_and_cleans_up_on_drop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = RoomKey::global();
        {
            let mut tap = registry.tap(room.clone());
            registry.deliver(&envelope(typing(&room, "u1"), None));
            assert!(tap.recv().await.is_some());
            assert_eq!(registry.connection_count(), 1);
        }
        assert_eq!(registry.connection_count(), 0);
    }
}
