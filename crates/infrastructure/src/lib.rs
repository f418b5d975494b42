//! 基础设施层实现。
//!
//! 提供消息存储的 PostgreSQL 仓储和基于 Redis Pub/Sub 的广播总线。

pub mod db;
pub mod redis;

pub use db::{create_pg_pool, PgChatMessageRepository};
pub use redis::{RedisBusError, RedisRoomBus};
