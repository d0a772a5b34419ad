//! 基础设施层实现。
//!
//! 提供数据库仓储、JWT 身份校验、Redis 限流计数与 Pub/Sub 传输，
//! 实现应用层定义的接口。

pub mod auth;
pub mod redis;
pub mod repository;

pub use auth::JwtIdentityVerifier;
pub use redis::{RedisRateLimiter, RedisTransport};
pub use repository::{create_pg_pool, PgMessageRepository, PgReadMarkerRepository};
