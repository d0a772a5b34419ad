//! Redis Pub/Sub 事件传输。
//!
//! 发布走连接管理器；订阅在独立任务里维持一条 Pub/Sub 连接，
//! 断线后自动重建并重新订阅。发布失败由上层总线降级为仅本地投递。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;

use application::{EventSink, EventTransport, TransportError};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct RedisTransport {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl RedisTransport {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let publish_conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            publish_conn,
        })
    }
}

#[async_trait]
impl EventTransport for RedisTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut conn = self.publish_conn.clone();
        redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|err| TransportError::failed(err.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, sink: Arc<dyn EventSink>) -> Result<(), TransportError> {
        let client = self.client.clone();
        let topic = topic.to_owned();

        tokio::spawn(async move {
            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => {
                        if let Err(err) = pubsub.subscribe(&topic).await {
                            tracing::warn!(error = %err, %topic, "订阅事件主题失败");
                        } else {
                            tracing::info!(%topic, "已订阅事件主题");
                            let mut stream = pubsub.on_message();
                            while let Some(msg) = stream.next().await {
                                match msg.get_payload::<Vec<u8>>() {
                                    Ok(payload) => sink.deliver(&payload).await,
                                    Err(err) => {
                                        tracing::warn!(error = %err, "读取订阅载荷失败");
                                    }
                                }
                            }
                            tracing::warn!(%topic, "订阅流中断，准备重连");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "无法建立 Pub/Sub 连接");
                    }
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        Ok(())
    }
}
