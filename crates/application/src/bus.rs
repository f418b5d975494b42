use async_trait::async_trait;
use domain::{ChatMessage, RoomName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 房间频道上传输的事件。
///
/// 系统通知的 `{user: "System", message}` 形态是客户端协议的一部分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEvent {
    Message(ChatMessage),
    Notice { user: String, message: String },
}

impl RoomEvent {
    pub fn system_notice(message: impl Into<String>) -> Self {
        Self::Notice {
            user: "System".to_string(),
            message: message.into(),
        }
    }

    /// 客户端 `chatMessage` 事件的负载：存储记录本身，或通知对象。
    pub fn to_client_payload(&self) -> serde_json::Value {
        match self {
            RoomEvent::Message(message) => {
                serde_json::to_value(message).unwrap_or(serde_json::Value::Null)
            }
            RoomEvent::Notice { user, message } => serde_json::json!({
                "user": user,
                "message": message,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl BusError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// 广播总线：按房间名分主题的发布/订阅媒介。
///
/// 投递语义是每个存活订阅者至多一次；持久化由消息存储负责，
/// 掉线的订阅者通过历史回填恢复。
#[async_trait]
pub trait RoomBus: Send + Sync {
    /// 发布事件到房间主题，送达当前订阅该主题的所有进程。
    async fn publish(&self, room: &RoomName, event: RoomEvent) -> Result<(), BusError>;

    /// 确保本进程订阅了该房间主题。幂等；每房间每进程一份订阅。
    async fn ensure_subscribed(&self, room: &RoomName) -> Result<(), BusError>;
}
