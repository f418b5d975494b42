use std::sync::{Arc, Mutex};

use application::{
    ChatService, ChatServiceDependencies, LocalRoomBus, RoomRegistry, SystemClock,
};
use async_trait::async_trait;
use axum::Router;
use domain::{ChatMessage, ChatMessageRepository, NewChatMessage, RepositoryError, RoomName};
use web_api::{AppState, JwtConfig, JwtService};

/// 内存消息存储，按插入顺序分配 seq。
#[derive(Default)]
pub struct MemoryRepository {
    messages: Mutex<Vec<ChatMessage>>,
}

#[async_trait]
impl ChatMessageRepository for MemoryRepository {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let stored = ChatMessage {
            id: message.id,
            room_name: message.room_name,
            sender_id: message.sender_id,
            body: message.body,
            kind: message.kind,
            media_url: message.media_url,
            media_kind: message.media_kind,
            created_at: message.created_at,
            seq: messages.len() as i64 + 1,
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_room(&self, room: &RoomName) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut found: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.room_name == room)
            .cloned()
            .collect();
        found.sort_by_key(|m| (m.created_at, m.seq));
        Ok(found)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError> {
        let mut rooms: Vec<RoomName> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.room_name.clone())
            .collect();
        rooms.dedup();
        Ok(rooms)
    }
}

/// 追加永远失败的存储，用于故障路径。
pub struct FailingRepository;

#[async_trait]
impl ChatMessageRepository for FailingRepository {
    async fn append(&self, _message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        Err(RepositoryError::storage("database offline"))
    }

    async fn list_by_room(&self, _room: &RoomName) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError> {
        Ok(Vec::new())
    }
}

/// 组装完整应用：内存/指定存储 + 进程内总线 + 投递泵。
/// 必须在 tokio 运行时内调用。
pub fn build_app_with(
    message_repository: Arc<dyn ChatMessageRepository>,
) -> (Router, Arc<JwtService>) {
    let bus = Arc::new(LocalRoomBus::default());
    let registry = Arc::new(RoomRegistry::new());

    // 投递泵：总线事件扇出到本地房间成员
    let mut deliveries = bus.subscribe();
    tokio::spawn({
        let registry = registry.clone();
        async move {
            while let Ok((room, event)) = deliveries.recv().await {
                registry.deliver(&room, &event).await;
            }
        }
    });

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        message_repository,
        bus: bus.clone(),
        clock: Arc::new(SystemClock),
    }));
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret-key-at-least-32-characters!".to_string(),
        expiration_hours: 24,
    }));

    let state = AppState::new(chat_service, bus, registry, jwt_service.clone());
    (web_api::router(state, &[]), jwt_service)
}

pub fn build_router() -> (Router, Arc<JwtService>) {
    build_app_with(Arc::new(MemoryRepository::default()))
}

pub fn bearer(jwt: &JwtService, uid: &str) -> String {
    format!("Bearer {}", jwt.generate_token(uid).expect("token"))
}
