use std::sync::Arc;

use domain::{ChatMessage, ChatMessageRepository, MessageKind, NewChatMessage, RoomName};

use crate::{
    bus::{RoomBus, RoomEvent},
    clock::Clock,
    error::ApplicationError,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub id: Option<String>,
    pub uid: String,
    pub message: String,
    pub room_name: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
}

pub struct ChatServiceDependencies {
    pub message_repository: Arc<dyn ChatMessageRepository>,
    pub bus: Arc<dyn RoomBus>,
    pub clock: Arc<dyn Clock>,
}

/// 聊天用例服务。HTTP 和 WebSocket 两条入口共用同一条
/// 持久化后发布的路径。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 发送一条消息：校验 → 追加存储 → 发布到总线。
    ///
    /// 发布只会在追加成功之后发起；未持久化的数据绝不广播。
    /// 追加成功后发布失败不回滚也不报错：存储是事实来源，
    /// 错过实时推送的客户端靠历史回填恢复。
    pub async fn send(&self, request: SendMessageRequest) -> Result<ChatMessage, ApplicationError> {
        let draft = NewChatMessage::new(
            request.id,
            request.room_name,
            request.uid,
            request.message,
            request.kind,
            request.media_url,
            request.media_kind,
            self.deps.clock.now(),
        )?;

        let stored = self.deps.message_repository.append(draft).await?;

        if let Err(err) = self
            .deps
            .bus
            .publish(&stored.room_name, RoomEvent::Message(stored.clone()))
            .await
        {
            tracing::error!(
                room = %stored.room_name,
                message_id = %stored.id,
                error = %err,
                "message persisted but live broadcast failed; clients recover via backfill"
            );
        }

        Ok(stored)
    }

    /// 房间历史，(created_at, seq) 升序。空房间返回空列表。
    pub async fn history(&self, room_name: &str) -> Result<Vec<ChatMessage>, ApplicationError> {
        let room = RoomName::parse(room_name)?;
        let messages = self.deps.message_repository.list_by_room(&room).await?;
        Ok(messages)
    }

    /// 向房间发布一条系统通知（如加入提示）。尽力而为。
    pub async fn announce(&self, room: &RoomName, text: impl Into<String>) {
        let event = RoomEvent::system_notice(text);
        if let Err(err) = self.deps.bus.publish(room, event).await {
            tracing::warn!(room = %room, error = %err, "failed to publish system notice");
        }
    }

    /// 启动时的活跃房间集合：出现过消息的所有房间。
    pub async fn active_rooms(&self) -> Result<Vec<RoomName>, ApplicationError> {
        Ok(self.deps.message_repository.list_rooms().await?)
    }
}
