//! WebSocket 连接网关
//!
//! 封装单个双向连接的全部生命周期：握手认证、按事件分发、
//! 广播转发、心跳回应和断开清理。状态机：
//! 认证失败直接拒绝升级；认证成功后自动加入 `"global"`，
//! 之后逐事件处理直到任一方向关闭。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use application::Identity;
use domain::{Attachment, ConnectionId, RoomKey};

use crate::state::AppState;

/// WebSocket 连接查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// 外部身份服务签发的凭证
    pub token: String,
}

/// 客户端发来的事件。房间键省略时回落到 `"global"`。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    Join {
        room: Option<String>,
    },
    Leave {
        room: Option<String>,
    },
    Typing {
        room: Option<String>,
        typing: bool,
    },
    Send {
        room: Option<String>,
        content: Option<String>,
        attachment: Option<Attachment>,
    },
    #[serde(rename_all = "camelCase")]
    Read {
        room: Option<String>,
        message_id: Uuid,
    },
}

/// 发回给调用方本人的回执帧（广播事件由 `RoomEvent` 承载）。
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    JoinAck {
        room: String,
        ok: bool,
    },
    LeaveAck {
        room: String,
        ok: bool,
    },
    SendAck {
        room: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'static str>,
    },
}

/// WebSocket 写操作命令
///
/// 统一管理所有对 sender 的写操作，回执与广播共用一个出口任务。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 处理 WebSocket 连接升级：凭证校验失败时拒绝升级，不保留任何状态。
pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, StatusCode> {
    let identity = match state.identity.verify(&query.token).await {
        Ok(identity) => identity,
        Err(_) => {
            tracing::warn!("WebSocket upgrade rejected: unauthenticated");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    tracing::info!(user_id = %identity.user_id, "WebSocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    // 登记连接：自动加入 global，首条连接广播上线
    let connection = state.chat.connect(&identity).await;
    let connection_id = connection.id;
    let mut events = connection.events;

    let (mut sender, mut incoming) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：回执命令和广播事件都从这里写出
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => match cmd {
                    WsCommand::SendText(text) => {
                        if sender.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    WsCommand::SendPong(data) => {
                        if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                            break;
                        }
                    }
                },
                Some(event) = events.recv() => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize room event");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        tracing::debug!(connection_id = %connection_id, "WebSocket发送任务结束");
    });

    // 接收任务：处理来自客户端的帧
    let recv_state = state.clone();
    let recv_identity = identity.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => {
                    dispatch_client_event(
                        &recv_state,
                        connection_id,
                        &recv_identity,
                        text.as_str(),
                        &cmd_tx,
                    )
                    .await;
                }
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            }
        }
        tracing::debug!(connection_id = %connection_id, "WebSocket接收任务结束");
    });

    // 任一方向结束即视为断开
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.chat.disconnect(connection_id, &identity.user_id).await;
}

/// 逐事件分发。任何单事件错误只回执给调用方，不中断连接。
async fn dispatch_client_event(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &Identity,
    raw: &str,
    cmd_tx: &mpsc::Sender<WsCommand>,
) {
    let event: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "忽略无法解析的客户端帧");
            return;
        }
    };

    match event {
        ClientEvent::Join { room } => {
            // join/leave 需要显式房间键，缺失或为空直接回执失败
            let frame = match room.map(RoomKey::parse) {
                Some(Ok(room)) => {
                    let ok = state.chat.join(connection_id, room.clone());
                    ServerFrame::JoinAck {
                        room: room.as_str().to_owned(),
                        ok,
                    }
                }
                _ => ServerFrame::JoinAck {
                    room: String::new(),
                    ok: false,
                },
            };
            reply(cmd_tx, &frame).await;
        }
        ClientEvent::Leave { room } => {
            let frame = match room.map(RoomKey::parse) {
                Some(Ok(room)) => {
                    let ok = state.chat.leave(connection_id, &room);
                    ServerFrame::LeaveAck {
                        room: room.as_str().to_owned(),
                        ok,
                    }
                }
                _ => ServerFrame::LeaveAck {
                    room: String::new(),
                    ok: false,
                },
            };
            reply(cmd_tx, &frame).await;
        }
        ClientEvent::Typing { room, typing } => {
            // 无回执；限流拒绝也静默
            if let Ok(room) = RoomKey::or_global(room) {
                state.chat.typing(connection_id, identity, room, typing).await;
            }
        }
        ClientEvent::Send {
            room,
            content,
            attachment,
        } => {
            let room = match RoomKey::or_global(room) {
                Ok(room) => room,
                Err(_) => {
                    reply(
                        cmd_tx,
                        &ServerFrame::SendAck {
                            room: String::new(),
                            ok: false,
                            error: Some("server_error"),
                        },
                    )
                    .await;
                    return;
                }
            };
            let result = state
                .chat
                .send(identity, room.clone(), content.unwrap_or_default(), attachment)
                .await;
            let frame = match result {
                Ok(_) => ServerFrame::SendAck {
                    room: room.as_str().to_owned(),
                    ok: true,
                    error: None,
                },
                Err(err) => ServerFrame::SendAck {
                    room: room.as_str().to_owned(),
                    ok: false,
                    error: Some(err.wire_code()),
                },
            };
            reply(cmd_tx, &frame).await;
        }
        ClientEvent::Read { room, message_id } => {
            if let Ok(room) = RoomKey::or_global(room) {
                state
                    .chat
                    .read_receipt(&identity.user_id, room, message_id)
                    .await;
            }
        }
    }
}

async fn reply(cmd_tx: &mpsc::Sender<WsCommand>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = cmd_tx.send(WsCommand::SendText(json)).await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize reply frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_wire_format() {
        let join: ClientEvent = serde_json::from_str(r#"{"type":"join","room":"math"}"#).unwrap();
        assert!(matches!(join, ClientEvent::Join { room: Some(r) } if r == "math"));

        let send: ClientEvent =
            serde_json::from_str(r#"{"type":"send","content":"hi"}"#).unwrap();
        assert!(matches!(
            send,
            ClientEvent::Send { room: None, content: Some(c), attachment: None } if c == "hi"
        ));

        let read: ClientEvent = serde_json::from_str(
            r#"{"type":"read","room":"global","messageId":"7a0bdec6-58f1-4c16-a6b1-d5fcb9bbb6ae"}"#,
        )
        .unwrap();
        assert!(matches!(read, ClientEvent::Read { .. }));

        let typing: ClientEvent =
            serde_json::from_str(r#"{"type":"typing","room":"global","typing":true}"#).unwrap();
        assert!(matches!(typing, ClientEvent::Typing { typing: true, .. }));
    }

    #[test]
    fn ack_frames_use_wire_codes() {
        let frame = ServerFrame::SendAck {
            room: "global".into(),
            ok: false,
            error: Some("rate_limited"),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "send_ack");
        assert_eq!(json["error"], "rate_limited");

        let ok = ServerFrame::JoinAck {
            room: "math".into(),
            ok: true,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["type"], "join_ack");
        assert_eq!(json["ok"], true);
    }
}
