//! 领域层。
//!
//! 聊天消息实体、房间值对象以及消息存储的仓储接口。

pub mod chat_message;
pub mod errors;
pub mod repository;
pub mod room;

pub use chat_message::{ChatMessage, MessageKind, NewChatMessage};
pub use errors::{DomainError, RepositoryError};
pub use repository::ChatMessageRepository;
pub use room::RoomName;
