//! 按用户、按动作的滑动窗口限流。
//!
//! 计数器语义：窗口内原子自增，首次自增时设置过期；自增后计数 ≤ 限额即放行。
//! 多进程部署必须共享计数器（Redis 实现见 infrastructure），单进程部署用
//! 这里的内存实现即可——进程本地计数在单进程时就是共享计数。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::UserId;

/// 限流动作类别，同时是计数器键的一部分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    Message,
    Typing,
}

impl RateAction {
    pub fn key(&self) -> &'static str {
        match self {
            RateAction::Message => "message",
            RateAction::Typing => "typing",
        }
    }
}

/// 单个动作的限额规则。
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateRule {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// 产品要求的两类限额，数字来自配置而非硬编码。
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub message: RateRule,
    pub typing: RateRule,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            message: RateRule::new(5, Duration::from_secs(1)),
            typing: RateRule::new(10, Duration::from_secs(10)),
        }
    }
}

/// 限流器接口。
///
/// 实现方约定 fail-open：计数后端不可达时必须放行（可用性优先于严格限流，
/// 这是有意的取舍），并自行记录降级日志。
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(
        &self,
        user_id: &UserId,
        action: RateAction,
        limit: u32,
        window: Duration,
    ) -> bool;
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// 进程内限流器。
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    buckets: Mutex<HashMap<(RateAction, UserId), Bucket>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow(
        &self,
        user_id: &UserId,
        action: RateAction,
        limit: u32,
        window: Duration,
    ) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let bucket = buckets
            .entry((action, user_id.clone()))
            .or_insert(Bucket {
                count: 0,
                window_start: now,
            });
        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count += 1;
        bucket.count <= limit
    }
}
