use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::UnreadSummary;
use domain::{Attachment, Message, RoomEvent, RoomKey, Timestamp};

use crate::{auth::authenticate, error::ApiError, state::AppState, ws_connection};

/// SSE 客户端的重连提示间隔。
const SSE_RETRY_HINT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RoomQuery {
    room: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    room: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SendPayload {
    room: Option<String>,
    content: Option<String>,
    attachment: Option<Attachment>,
}

#[derive(Debug, Deserialize)]
struct ReadPayload {
    room: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadResponse {
    room: RoomKey,
    last_read_at: Timestamp,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/chat", chat_routes())
        .route("/ws", get(ws_connection::websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages))
        .route("/send", post(send_message))
        .route("/stream", get(stream))
        .route("/unread", get(unread))
        .route("/read", post(mark_read))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 房间历史尾部，从旧到新；limit 缺省 100、上限 200。
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room = RoomKey::or_global(query.room)?;
    let messages = state.chat.history(&room, query.limit).await?;
    Ok(Json(messages))
}

/// REST 发送路径：与 WebSocket 网关共用同一条用例服务路径。
async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendPayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let room = RoomKey::or_global(payload.room)?;
    let message = state
        .chat
        .send(
            &identity,
            room,
            payload.content.unwrap_or_default(),
            payload.attachment,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// 服务端推送回退流：单向、仅 message 事件，先发一个重连提示。
async fn stream(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let room = RoomKey::or_global(query.room)?;
    tracing::debug!(room = %room, "SSE 回退流已打开");

    let tap = state.chat.open_stream(room);
    let events = tap.filter_map(|event| async move {
        match &event {
            RoomEvent::Message(_) => Event::default().json_data(&event).ok().map(Ok),
            // 输入状态 / 已读回执 / 在线状态是双向通道专属
            _ => None,
        }
    });
    let retry_hint =
        futures_util::stream::once(async { Ok(Event::default().retry(SSE_RETRY_HINT)) });

    Ok(Sse::new(retry_hint.chain(events)).keep_alive(KeepAlive::default()))
}

async fn unread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RoomQuery>,
) -> Result<Json<UnreadSummary>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let room = RoomKey::or_global(query.room)?;
    let summary = state.chat.unread(&room, &identity.user_id).await?;
    Ok(Json(summary))
}

/// 将调用者的已读标记推进到当前时刻。
async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReadPayload>,
) -> Result<Json<ReadResponse>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let room = RoomKey::or_global(payload.room)?;
    let last_read_at = state.chat.mark_read(&room, &identity.user_id).await?;
    Ok(Json(ReadResponse { room, last_read_at }))
}
