//! 应用层实现。
//!
//! 围绕消息存储与广播总线的用例服务：持久化后发布、历史回填、
//! 进程内的房间成员登记与本地扇出。

pub mod bus;
pub mod clock;
pub mod error;
pub mod local_bus;
pub mod registry;
pub mod services;

pub use bus::{BusError, RoomBus, RoomEvent};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use local_bus::LocalRoomBus;
pub use registry::{ConnectionId, RoomRegistry};
pub use services::{ChatService, ChatServiceDependencies, SendMessageRequest};
