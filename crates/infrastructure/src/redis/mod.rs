//! Redis 适配器
//!
//! 多进程部署共享的两块可变状态都落在这里：限流计数器和事件扇出的
//! Pub/Sub 传输。

pub mod limiter;
pub mod transport;

pub use limiter::RedisRateLimiter;
pub use transport::RedisTransport;
