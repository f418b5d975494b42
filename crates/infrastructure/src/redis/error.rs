use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("event codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("subscriber task is not running")]
    SubscriberGone,
}
