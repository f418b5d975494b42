//! Redis Pub/Sub 广播总线。
//!
//! 发布端走 ConnectionManager（自动重连），订阅端是独立任务，
//! 收到的事件通过 mpsc 交给进程内的投递泵。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use application::{BusError, RoomBus, RoomEvent};
use async_trait::async_trait;
use config::RedisConfig;
use domain::RoomName;
use redis::aio::ConnectionManager;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::error::RedisBusError;
use super::publisher::RedisRoomPublisher;
use super::subscriber::{SubscriberCommand, SubscriberTask};

pub struct RedisRoomBus {
    publisher: RedisRoomPublisher,
    channels: Arc<RwLock<HashSet<String>>>,
    commands: mpsc::UnboundedSender<SubscriberCommand>,
    subscriber: Mutex<Option<JoinHandle<()>>>,
}

impl RedisRoomBus {
    /// 建立发布连接并启动订阅任务。
    ///
    /// 返回的接收端承载远端广播来的 (房间, 事件) 对，由调用方
    /// 接到本地注册表上扇出。
    pub async fn connect(
        config: &RedisConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<(RoomName, RoomEvent)>), RedisBusError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let publisher = RedisRoomPublisher::new(conn, config.room_channel_prefix.clone());

        let channels = Arc::new(RwLock::new(HashSet::new()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = SubscriberTask::new(
            client,
            channels.clone(),
            config.room_channel_prefix.clone(),
            Duration::from_millis(config.reconnect_base_ms),
            Duration::from_millis(config.reconnect_max_ms),
            command_rx,
            event_tx,
        );
        let handle = tokio::spawn(task.run());

        Ok((
            Self {
                publisher,
                channels,
                commands: command_tx,
                subscriber: Mutex::new(Some(handle)),
            },
            event_rx,
        ))
    }

    /// 通知订阅任务退出并等待其结束。
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SubscriberCommand::Shutdown);
        if let Some(handle) = self.subscriber.lock().await.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "redis subscriber task panicked");
            }
        }
    }
}

#[async_trait]
impl RoomBus for RedisRoomBus {
    async fn publish(&self, room: &RoomName, event: RoomEvent) -> Result<(), BusError> {
        self.publisher
            .publish(room, &event)
            .await
            .map_err(|err| BusError::unavailable(err.to_string()))
    }

    /// 登记房间频道，首次出现时让订阅任务补订。幂等。
    async fn ensure_subscribed(&self, room: &RoomName) -> Result<(), BusError> {
        let channel = self.publisher.channel_for(room);
        let inserted = self.channels.write().await.insert(channel.clone());
        if inserted {
            self.commands
                .send(SubscriberCommand::Subscribe(channel))
                .map_err(|_| BusError::unavailable(RedisBusError::SubscriberGone.to_string()))?;
        }
        Ok(())
    }
}
