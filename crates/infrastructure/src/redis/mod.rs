pub mod bus;
pub mod error;
pub mod publisher;
pub mod subscriber;

pub use bus::RedisRoomBus;
pub use error::RedisBusError;
pub use publisher::RedisRoomPublisher;
