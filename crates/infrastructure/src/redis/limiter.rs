//! Redis 限流计数器。
//!
//! 键 `rl:{action}:{user}` 原子自增，窗口首次自增时设置过期。
//! Redis 不可达时 fail-open：放行并记录降级日志——可用性优先于
//! 严格限流，这是有意的取舍。

use std::time::Duration;

use async_trait::async_trait;
use domain::UserId;
use redis::aio::ConnectionManager;

use application::{RateAction, RateLimiter};

pub struct RedisRateLimiter {
    conn: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(
        &self,
        user_id: &UserId,
        action: RateAction,
        limit: u32,
        window: Duration,
    ) -> bool {
        let key = format!("rl:{}:{}", action.key(), user_id);
        let mut conn = self.conn.clone();

        let count: i64 = match redis::cmd("INCR").arg(&key).query_async(&mut conn).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, %key, "限流计数器不可达，放行");
                return true;
            }
        };

        if count == 1 {
            let ttl = window.as_secs().max(1);
            if let Err(err) = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl)
                .query_async::<i64>(&mut conn)
                .await
            {
                tracing::warn!(error = %err, %key, "设置计数器过期失败");
            }
        }

        count <= i64::from(limit)
    }
}
