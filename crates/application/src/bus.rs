//! 房间事件的跨进程扇出。
//!
//! 代理边界收敛成一个很小的接口：`publish(topic, bytes)` / `subscribe(topic, sink)`。
//! 单进程部署用 `InMemoryTransport` 原样回环，多进程部署由 Redis Pub/Sub 实现
//! 同一接口；两种情况下本地投递都走登记簿的同一条 `deliver` 路径。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{ConnectionId, RoomEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ConnectionRegistry;

/// 在代理上传输的事件信封。
///
/// `exclude` 是发送者所在进程的连接 id；其他进程没有这个 id，
/// 自然对所有本地连接投递——与发送端 socket 级排除等效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: RoomEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ConnectionId>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport failed: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 订阅方收到的原始载荷的处理端。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, payload: &[u8]);
}

/// 代理传输接口。
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
    async fn subscribe(&self, topic: &str, sink: Arc<dyn EventSink>) -> Result<(), TransportError>;
}

/// 单进程传输：发布直接回环到本进程的订阅端。
#[derive(Default)]
pub struct InMemoryTransport {
    sinks: RwLock<HashMap<String, Vec<Arc<dyn EventSink>>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let sinks: Vec<Arc<dyn EventSink>> = {
            let map = self.sinks.read().expect("transport lock poisoned");
            map.get(topic).cloned().unwrap_or_default()
        };
        for sink in sinks {
            sink.deliver(&payload).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, sink: Arc<dyn EventSink>) -> Result<(), TransportError> {
        self.sinks
            .write()
            .expect("transport lock poisoned")
            .entry(topic.to_owned())
            .or_default()
            .push(sink);
        Ok(())
    }
}

struct RegistrySink {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl EventSink for RegistrySink {
    async fn deliver(&self, payload: &[u8]) {
        match serde_json::from_slice::<EventEnvelope>(payload) {
            Ok(envelope) => self.registry.deliver(&envelope),
            Err(err) => {
                tracing::warn!(error = %err, "丢弃无法解析的总线载荷");
            }
        }
    }
}

/// 扇出总线：把房间事件发布到代理，代理把它带回每个有本地订阅者的进程。
///
/// 代理不可达时降级为仅本地投递——消息此刻已经落库，其他进程的用户
/// 等下一次拉历史即可补上；这是记录日志的静默降级，不是致命错误。
pub struct FanoutBus {
    transport: Arc<dyn EventTransport>,
    registry: Arc<ConnectionRegistry>,
    topic: String,
}

impl FanoutBus {
    pub const DEFAULT_TOPIC: &'static str = "chat:events";

    /// 组装总线并订阅代理主题，订阅端直接喂给登记簿。
    pub async fn start(
        transport: Arc<dyn EventTransport>,
        registry: Arc<ConnectionRegistry>,
        topic: impl Into<String>,
    ) -> Result<Arc<Self>, TransportError> {
        let topic = topic.into();
        let sink = Arc::new(RegistrySink {
            registry: Arc::clone(&registry),
        });
        transport.subscribe(&topic, sink).await?;
        Ok(Arc::new(Self {
            transport,
            registry,
            topic,
        }))
    }

    pub async fn publish(&self, event: RoomEvent) {
        self.publish_excluding(event, None).await;
    }

    pub async fn publish_excluding(&self, event: RoomEvent, exclude: Option<ConnectionId>) {
        let envelope = EventEnvelope { event, exclude };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "room event serialization failed");
                return;
            }
        };
        if let Err(err) = self.transport.publish(&self.topic, payload).await {
            tracing::warn!(
                error = %err,
                topic = %self.topic,
                "event broker unavailable, delivering to local connections only"
            );
            self.registry.deliver(&envelope);
        }
    }
}
