use async_trait::async_trait;

use crate::{ChatMessage, NewChatMessage, RepositoryError, RoomName};

/// 消息存储接口：只追加，没有更新和删除。
#[async_trait]
pub trait ChatMessageRepository: Send + Sync {
    /// 持久化一条消息，返回包含存储分配字段（seq）的完整记录。
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError>;

    /// 按 (created_at, seq) 升序返回房间内全部消息；空房间返回空列表。
    async fn list_by_room(&self, room: &RoomName) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// 出现过消息的全部房间名，进程启动时用于订阅发现。
    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError>;
}
