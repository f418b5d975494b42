use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::room::RoomName;

/// 消息类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
            MessageKind::File => "file",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "audio" => Ok(MessageKind::Audio),
            "video" => Ok(MessageKind::Video),
            "file" => Ok(MessageKind::File),
            other => Err(DomainError::invalid_argument(
                "type",
                format!("unknown message kind: {other}"),
            )),
        }
    }
}

/// 待持久化的消息。
///
/// 校验在构造时完成；`created_at` 在持久化路径上由服务层时钟赋值。
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub id: String,
    pub room_name: RoomName,
    pub sender_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub media_url: String,
    pub media_kind: String,
    pub created_at: DateTime<Utc>,
}

impl NewChatMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Option<String>,
        room_name: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
        kind: MessageKind,
        media_url: Option<String>,
        media_kind: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let room_name = RoomName::parse(room_name)?;

        let sender_id = sender_id.into().trim().to_owned();
        if sender_id.is_empty() {
            return Err(DomainError::invalid_argument("uid", "cannot be empty"));
        }

        let body = body.into();
        if body.trim().is_empty() {
            return Err(DomainError::invalid_argument("message", "cannot be empty"));
        }

        // 客户端未提供 id 时由服务端生成；该 id 不保证全局唯一
        let id = id
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            id,
            room_name,
            sender_id,
            body,
            kind,
            media_url: media_url.unwrap_or_default(),
            media_kind: media_kind.unwrap_or_else(|| "none".to_string()),
            created_at: now,
        })
    }
}

/// 已持久化的聊天消息。一旦存储即不可变，没有更新或删除路径。
///
/// 线上字段名沿用客户端协议（`uid`、`roomName`、`mediaUrl` 等）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "roomName")]
    pub room_name: RoomName,
    #[serde(rename = "uid")]
    pub sender_id: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "mediaUrl")]
    pub media_url: String,
    #[serde(rename = "mediaType")]
    pub media_kind: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// 存储分配的插入序号，只作为同一时间戳消息的排序决胜键。
    #[serde(skip)]
    pub seq: i64,
}
