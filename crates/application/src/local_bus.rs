// 进程内总线实现：单机部署和测试用，不跨进程。
use async_trait::async_trait;
use domain::RoomName;
use tokio::sync::broadcast;

use crate::bus::{BusError, RoomBus, RoomEvent};

#[derive(Clone)]
pub struct LocalRoomBus {
    sender: broadcast::Sender<(RoomName, RoomEvent)>,
}

impl LocalRoomBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 投递泵从这里消费，再经 RoomRegistry 扇出到本地连接。
    pub fn subscribe(&self) -> broadcast::Receiver<(RoomName, RoomEvent)> {
        self.sender.subscribe()
    }
}

impl Default for LocalRoomBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl RoomBus for LocalRoomBus {
    async fn publish(&self, room: &RoomName, event: RoomEvent) -> Result<(), BusError> {
        // 没有接收端不算失败：本地没有任何已连接的客户端而已
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send((room.clone(), event))
            .map_err(|err| BusError::unavailable(err.to_string()))?;
        Ok(())
    }

    async fn ensure_subscribed(&self, _room: &RoomName) -> Result<(), BusError> {
        // 单进程总线收到一切，无需按房间订阅
        Ok(())
    }
}
