//! WebSocket 连接生命周期
//!
//! 每条连接一个出站无界通道：写出任务独占 socket 写端，把应用层
//! 事件序列化成文本帧；读入循环解析客户端命令并委托给投递协调器。
//! 业务失败通过 `error` 事件回给当前连接，不中断连接本身。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use application::{
    ApplicationError, ConnectionHandle, SendMessageRequest, StorageError,
    TRANSLATION_FAILED_MESSAGE,
};
use domain::{ConnectionId, DomainError, MessageId, RoomId, ServerEvent, UserId};
use serde::Deserialize;

use crate::state::AppState;

/// 客户端发来的命令。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SendMessage {
        room_id: String,
        content: String,
        #[serde(default)]
        reply_to: Option<MessageId>,
    },
    JoinRoom {
        peer_id: String,
    },
    OnlineUsers,
    Ping,
}

pub async fn run(socket: WebSocket, state: AppState, user_id: UserId, client_ip: String) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection_id = ConnectionId::generate();
    let handle = ConnectionHandle::new(
        user_id.clone(),
        connection_id,
        time::OffsetDateTime::now_utc(),
        tx,
    );

    state.coordinator.connect(handle.clone()).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket connected");

    let (mut sender, mut incoming) = socket.split();

    // 写出任务：独占 socket 写端，直到出站通道关闭或对端不可写
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize websocket payload");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = incoming.next().await {
        match message {
            WsMessage::Text(text) => {
                handle_text(&state, &handle, &client_ip, text.as_str()).await;
            }
            WsMessage::Close(_) => break,
            // 底层已回应协议层 ping，二进制帧不在协议里
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
        }
    }

    state.coordinator.disconnect(&user_id, connection_id).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket disconnected");

    // 最后一个发送端随句柄释放，写出任务随之自然退出
    drop(handle);
    let _ = send_task.await;
}

async fn handle_text(state: &AppState, handle: &ConnectionHandle, client_ip: &str, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            reply(
                handle,
                error_event("INVALID_MESSAGE", format!("malformed client message: {err}")),
            );
            return;
        }
    };

    match message {
        ClientMessage::SendMessage {
            room_id,
            content,
            reply_to,
        } => {
            let room_id = match RoomId::new(room_id) {
                Ok(room_id) => room_id,
                Err(err) => {
                    reply(handle, application_error_event(&err.into()));
                    return;
                }
            };
            let request = SendMessageRequest {
                room_id,
                sender_id: handle.user_id().clone(),
                text: content,
                reply_to,
                client_ip: Some(client_ip.to_string()),
            };
            if let Err(err) = state.coordinator.send_message(request).await {
                reply(handle, application_error_event(&err));
            }
        }
        ClientMessage::JoinRoom { peer_id } => {
            let joined = match UserId::new(peer_id) {
                Ok(peer) => state.coordinator.open_private_room(handle.user_id(), &peer).await,
                Err(err) => Err(err.into()),
            };
            match joined {
                Ok(room_id) => reply(handle, ServerEvent::RoomJoined { room_id }),
                Err(err) => reply(handle, application_error_event(&err)),
            }
        }
        ClientMessage::OnlineUsers => {
            state.coordinator.send_presence_snapshot(handle).await;
        }
        ClientMessage::Ping => {
            reply(handle, ServerEvent::Pong);
        }
    }
}

/// 通道已关闭说明连接正在拆除，丢弃即可。
fn reply(handle: &ConnectionHandle, event: ServerEvent) {
    let _ = handle.send(event);
}

fn error_event(code: &str, message: impl Into<String>) -> ServerEvent {
    ServerEvent::Error {
        code: code.to_string(),
        message: message.into(),
    }
}

fn application_error_event(error: &ApplicationError) -> ServerEvent {
    match error {
        ApplicationError::Domain(DomainError::Validation { field, message }) => {
            error_event("INVALID_ARGUMENT", format!("{field}: {message}"))
        }
        ApplicationError::Domain(DomainError::AccessDenied { action }) => {
            error_event("ACCESS_DENIED", action.clone())
        }
        ApplicationError::Storage(StorageError::NotFound { resource }) => {
            error_event("NOT_FOUND", resource.clone())
        }
        ApplicationError::Storage(StorageError::Storage { .. }) => {
            error_event("STORAGE_ERROR", "message could not be stored")
        }
        ApplicationError::RateLimited { retry_after } => {
            let message = match retry_after {
                Some(wait) => format!("rate limit exceeded, retry in {}s", wait.as_secs().max(1)),
                None => "rate limit exceeded".to_string(),
            };
            error_event("RATE_LIMITED", message)
        }
        ApplicationError::TranslationFailed { .. } => {
            error_event("TRANSLATION_FAILED", TRANSLATION_FAILED_MESSAGE)
        }
        ApplicationError::Push(err) => error_event("PUSH_ERROR", err.to_string()),
    }
}
