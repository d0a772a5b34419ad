#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};

use application::{
    ChatService, ChatServiceDependencies, ConnectionRegistry, FanoutBus, InMemoryTransport,
    MemoryMessageRepository, MemoryRateLimiter, MemoryReadMarkerRepository, PresenceTracker,
    RateLimits, SystemClock,
};
use infrastructure::JwtIdentityVerifier;
use web_api::{router, AppState};

pub const JWT_SECRET: &str = "integration-test-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn build_router() -> axum::Router {
    let registry = Arc::new(ConnectionRegistry::new());
    let bus = FanoutBus::start(
        Arc::new(InMemoryTransport::new()),
        Arc::clone(&registry),
        FanoutBus::DEFAULT_TOPIC,
    )
    .await
    .expect("start fanout bus");

    let chat = ChatService::new(ChatServiceDependencies {
        messages: Arc::new(MemoryMessageRepository::new()),
        read_markers: Arc::new(MemoryReadMarkerRepository::new()),
        rate_limiter: Arc::new(MemoryRateLimiter::new()),
        clock: Arc::new(SystemClock),
        registry,
        presence: Arc::new(PresenceTracker::new()),
        bus,
        limits: RateLimits::default(),
    });

    let state = AppState::new(
        Arc::new(chat),
        Arc::new(JwtIdentityVerifier::new(JWT_SECRET)),
    );
    router(state)
}

pub async fn spawn_server() -> SocketAddr {
    let router = build_router().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.ok();
    });
    addr
}

/// 签发测试用凭证（生产环境里由外部身份服务签发）。
pub fn token(id: &str, name: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        id: String,
        name: String,
        exp: i64,
    }
    let claims = Claims {
        id: id.to_owned(),
        name: name.to_owned(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode test token")
}

pub async fn connect_ws(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (socket, _) = connect_async(url).await.expect("ws connect");
    socket
}

pub async fn send_json(socket: &mut WsClient, value: serde_json::Value) {
    socket
        .send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// 读取下一帧文本 JSON，忽略控制帧。
pub async fn next_json(socket: &mut WsClient) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for ws frame")
            .expect("ws stream ended")
            .expect("ws frame error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("ws frame json");
        }
    }
}

/// 丢弃不匹配的帧，直到谓词命中；返回命中的帧。
pub async fn wait_for(
    socket: &mut WsClient,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    loop {
        let frame = next_json(socket).await;
        if predicate(&frame) {
            return frame;
        }
    }
}

/// 等待某个用户的 presence 事件，作为“连接已在服务端登记”的同步点。
pub async fn wait_for_presence(
    socket: &mut WsClient,
    user_id: &str,
    online: bool,
) -> serde_json::Value {
    wait_for(socket, |v| {
        v["type"] == "presence" && v["userId"] == user_id && v["online"] == online
    })
    .await
}
