//! WebSocket 网关。
//!
//! 每条连接拆成发送/接收两个任务：发送任务统一持有 socket 写端，
//! 合并来自注册表的房间事件和接收任务下发的写命令；接收任务解析
//! 客户端事件并委托应用层。连接断开时从注册表摘除，不通知房间。

use application::{ConnectionId, RoomEvent, SendMessageRequest};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::RoomName;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::routes::SendMessagePayload;
use crate::state::AppState;

/// 客户端事件，外层 `{event, data}` 信封。
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientEvent {
    #[serde(rename = "joinRoom")]
    JoinRoom {
        #[serde(rename = "roomName")]
        room_name: String,
    },
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessagePayload),
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
enum ServerEvent {
    #[serde(rename = "chatMessage")]
    ChatMessage(serde_json::Value),
    #[serde(rename = "error")]
    Error { message: String },
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

pub(crate) async fn handle_socket(socket: WebSocket, state: AppState, uid: String) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RoomEvent>();
    state.registry.connect(conn_id, event_tx).await;
    tracing::info!(connection = %conn_id, uid, "websocket connected");

    let (mut sender, mut incoming) = socket.split();

    // mpsc channel 解耦对 sender 的写访问
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：统一处理所有对 WebSocket sender 的写操作
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(WsCommand::SendText(text)) => {
                        if sender.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(WsCommand::SendPong(data)) => {
                        if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                event = event_rx.recv() => match event {
                    Some(event) => {
                        let frame = ServerEvent::ChatMessage(event.to_client_payload());
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    // 接收任务：处理来自客户端的事件
    let recv_task = tokio::spawn({
        let state = state.clone();
        let uid = uid.clone();
        async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, &state, conn_id, &uid, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    });

    // 任意一个任务结束即视为连接断开
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.registry.disconnect(conn_id).await;
    tracing::info!(connection = %conn_id, uid, "websocket disconnected");
}

async fn handle_incoming(
    message: WsMessage,
    state: &AppState,
    conn_id: ConnectionId,
    uid: &str,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> Result<(), ()> {
    match message {
        WsMessage::Close(_) => Err(()),
        WsMessage::Ping(data) => cmd_tx
            .send(WsCommand::SendPong(data.to_vec()))
            .await
            .map_err(|_| ()),
        WsMessage::Pong(_) => Ok(()),
        WsMessage::Binary(_) => {
            tracing::debug!(connection = %conn_id, "ignoring binary frame");
            Ok(())
        }
        WsMessage::Text(text) => {
            handle_client_event(text.as_str(), state, conn_id, uid, cmd_tx).await;
            Ok(())
        }
    }
}

async fn handle_client_event(
    text: &str,
    state: &AppState,
    conn_id: ConnectionId,
    uid: &str,
    cmd_tx: &mpsc::Sender<WsCommand>,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            send_error(cmd_tx, format!("malformed event: {err}")).await;
            return;
        }
    };

    match event {
        ClientEvent::JoinRoom { room_name } => {
            let room = match RoomName::parse(room_name) {
                Ok(room) => room,
                Err(err) => {
                    send_error(cmd_tx, err.to_string()).await;
                    return;
                }
            };

            if !state.registry.join(conn_id, &room).await {
                send_error(cmd_tx, "connection is not registered").await;
                return;
            }

            // 订阅失败不阻止加入，本地扇出照常工作，重连后补订
            if let Err(err) = state.bus.ensure_subscribed(&room).await {
                tracing::warn!(room = %room, error = %err, "room subscription deferred");
            }

            // ensure_subscribed 只保证订阅已入队；总线先处理下面这条
            // PUBLISH 时，首个加入者会错过自己的通知。at-most-once
            // 语义下可接受，通知不持久化也不回填。
            state
                .chat_service
                .announce(&room, format!("{uid} has joined the room."))
                .await;
        }
        ClientEvent::SendMessage(payload) => {
            if payload.uid != uid {
                send_error(cmd_tx, "uid does not match authenticated account").await;
                return;
            }

            // 发送失败只回给发起方，不影响房间内其他连接
            if let Err(err) = state
                .chat_service
                .send(SendMessageRequest {
                    id: payload.id,
                    uid: payload.uid,
                    message: payload.message,
                    room_name: payload.room_name,
                    kind: payload.kind,
                    media_url: payload.media_url,
                    media_kind: payload.media_kind,
                })
                .await
            {
                send_error(cmd_tx, err.to_string()).await;
            }
        }
    }
}

async fn send_error(cmd_tx: &mpsc::Sender<WsCommand>, message: impl Into<String>) {
    let frame = ServerEvent::Error {
        message: message.into(),
    };
    match serde_json::to_string(&frame) {
        Ok(json) => {
            let _ = cmd_tx.send(WsCommand::SendText(json)).await;
        }
        Err(err) => tracing::warn!(error = %err, "failed to serialize error frame"),
    }
}
