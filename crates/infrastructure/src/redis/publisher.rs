//! 房间事件发布端。
//!
//! 每个房间一个频道，频道名 = 前缀 + 房间名。载荷为 JSON 编码的
//! 房间事件，发布是 at-most-once：没有订阅者时消息直接丢弃。

use application::RoomEvent;
use domain::RoomName;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::error::RedisBusError;

pub struct RedisRoomPublisher {
    conn: ConnectionManager,
    channel_prefix: String,
}

impl RedisRoomPublisher {
    pub fn new(conn: ConnectionManager, channel_prefix: String) -> Self {
        Self {
            conn,
            channel_prefix,
        }
    }

    pub fn channel_for(&self, room: &RoomName) -> String {
        format!("{}{}", self.channel_prefix, room.as_str())
    }

    pub async fn publish(&self, room: &RoomName, event: &RoomEvent) -> Result<(), RedisBusError> {
        let payload = serde_json::to_string(event)?;
        let channel = self.channel_for(room);
        // ConnectionManager 克隆很廉价，内部复用同一条连接
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(&channel, payload).await?;
        tracing::debug!(channel, receivers, "published room event");
        Ok(())
    }
}
