//! 消息仓储的 PostgreSQL 实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatMessage, ChatMessageRepository, MessageKind, NewChatMessage, RepositoryError, RoomName,
};
use sqlx::{FromRow, PgPool};

/// 数据库消息记录
#[derive(Debug, Clone, FromRow)]
struct ChatMessageRecord {
    seq: i64,
    id: String,
    room_name: String,
    sender_id: String,
    body: String,
    kind: String,
    media_url: String,
    media_kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatMessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(record: ChatMessageRecord) -> Result<Self, Self::Error> {
        let room_name = RoomName::parse(record.room_name)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;
        let kind: MessageKind = record
            .kind
            .parse()
            .map_err(|err: domain::DomainError| RepositoryError::storage(err.to_string()))?;

        Ok(ChatMessage {
            id: record.id,
            room_name,
            sender_id: record.sender_id,
            body: record.body,
            kind,
            media_url: record.media_url,
            media_kind: record.media_kind,
            created_at: record.created_at,
            seq: record.seq,
        })
    }
}

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::storage(other.to_string()),
    }
}

#[derive(Clone)]
pub struct PgChatMessageRepository {
    pool: PgPool,
}

impl PgChatMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatMessageRepository for PgChatMessageRepository {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            INSERT INTO chat_messages (id, room_name, sender_id, body, kind, media_url, media_kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING seq, id, room_name, sender_id, body, kind, media_url, media_kind, created_at
            "#,
        )
        .bind(&message.id)
        .bind(message.room_name.as_str())
        .bind(&message.sender_id)
        .bind(&message.body)
        .bind(message.kind.as_str())
        .bind(&message.media_url)
        .bind(&message.media_kind)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatMessage::try_from(record)
    }

    async fn list_by_room(&self, room: &RoomName) -> Result<Vec<ChatMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            SELECT seq, id, room_name, sender_id, body, kind, media_url, media_kind, created_at
            FROM chat_messages
            WHERE room_name = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(room.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError> {
        let names: Vec<String> =
            sqlx::query_scalar(r#"SELECT DISTINCT room_name FROM chat_messages"#)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        names
            .into_iter()
            .map(|name| {
                RoomName::parse(name).map_err(|err| RepositoryError::storage(err.to_string()))
            })
            .collect()
    }
}
