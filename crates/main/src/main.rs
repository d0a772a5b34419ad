//! 主应用程序入口
//!
//! 组装存储、扇出、限流与身份校验，启动 Axum Web 服务。

use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, ConnectionRegistry, EventTransport, FanoutBus,
    IdentityVerifier, InMemoryTransport, MemoryRateLimiter, PresenceTracker, RateLimiter,
    RateLimits, RateRule, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, JwtIdentityVerifier, PgMessageRepository, PgReadMarkerRepository,
    RedisRateLimiter, RedisTransport,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let presence = Arc::new(PresenceTracker::new());

    // 配置了 Redis 就接入跨进程扇出与共享限流计数，否则单进程运行
    let (transport, rate_limiter): (Arc<dyn EventTransport>, Arc<dyn RateLimiter>) =
        match &config.redis.url {
            Some(url) => {
                let transport = RedisTransport::connect(url).await?;
                let limiter = RedisRateLimiter::connect(url).await?;
                tracing::info!("Redis 扇出与限流已接入");
                (Arc::new(transport), Arc::new(limiter))
            }
            None => {
                tracing::info!("未配置 REDIS_URL，单进程运行（内存扇出 + 内存限流）");
                (
                    Arc::new(InMemoryTransport::new()),
                    Arc::new(MemoryRateLimiter::new()),
                )
            }
        };

    let bus =
        FanoutBus::start(transport, Arc::clone(&registry), config.redis.topic.clone()).await?;

    let limits = RateLimits {
        message: RateRule::new(
            config.rate_limit.message_limit,
            Duration::from_secs(config.rate_limit.message_window_secs),
        ),
        typing: RateRule::new(
            config.rate_limit.typing_limit,
            Duration::from_secs(config.rate_limit.typing_window_secs),
        ),
    };

    let chat = ChatService::new(ChatServiceDependencies {
        messages: Arc::new(PgMessageRepository::new(pg_pool.clone())),
        read_markers: Arc::new(PgReadMarkerRepository::new(pg_pool)),
        rate_limiter,
        clock: Arc::new(SystemClock),
        registry,
        presence,
        bus,
        limits,
    });

    let identity: Arc<dyn IdentityVerifier> =
        Arc::new(JwtIdentityVerifier::new(&config.jwt.secret));
    let state = AppState::new(Arc::new(chat), identity);

    // 启动 Web 服务器
    let app = router(state);
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;

    tracing::info!(
        "聊天服务启动在 http://{}:{}",
        config.server.host,
        config.server.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
