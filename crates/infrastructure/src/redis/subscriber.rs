//! 房间事件订阅端。
//!
//! 独立任务持有一条 Pub/Sub 连接，按需追加频道订阅。
//! 连接断开后按指数退避重连（基数 50ms，翻倍，封顶 2000ms），
//! 重连成功后重新订阅共享集合里记录的全部频道。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use application::RoomEvent;
use domain::RoomName;
use futures_util::StreamExt;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug)]
pub enum SubscriberCommand {
    Subscribe(String),
    Shutdown,
}

enum Step {
    Message(redis::Msg),
    Disconnected,
    Command(Option<SubscriberCommand>),
}

pub struct SubscriberTask {
    client: redis::Client,
    channels: Arc<RwLock<HashSet<String>>>,
    channel_prefix: String,
    backoff_base: Duration,
    backoff_max: Duration,
    commands: mpsc::UnboundedReceiver<SubscriberCommand>,
    events: mpsc::UnboundedSender<(RoomName, RoomEvent)>,
}

impl SubscriberTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: redis::Client,
        channels: Arc<RwLock<HashSet<String>>>,
        channel_prefix: String,
        backoff_base: Duration,
        backoff_max: Duration,
        commands: mpsc::UnboundedReceiver<SubscriberCommand>,
        events: mpsc::UnboundedSender<(RoomName, RoomEvent)>,
    ) -> Self {
        Self {
            client,
            channels,
            channel_prefix,
            backoff_base,
            backoff_max,
            commands,
            events,
        }
    }

    pub async fn run(mut self) {
        let mut backoff = self.backoff_base;
        loop {
            let mut pubsub = match self.client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        retry_in_ms = backoff.as_millis() as u64,
                        "redis subscriber connect failed"
                    );
                    if self.sleep_or_shutdown(backoff).await {
                        return;
                    }
                    backoff = next_backoff(backoff, self.backoff_max);
                    continue;
                }
            };

            // 重新订阅共享集合里登记过的全部频道
            let wanted: Vec<String> = self.channels.read().await.iter().cloned().collect();
            let mut resubscribe_failed = false;
            for channel in &wanted {
                if let Err(err) = pubsub.subscribe(channel).await {
                    tracing::warn!(channel, error = %err, "resubscribe failed");
                    resubscribe_failed = true;
                    break;
                }
            }
            if resubscribe_failed {
                if self.sleep_or_shutdown(backoff).await {
                    return;
                }
                backoff = next_backoff(backoff, self.backoff_max);
                continue;
            }

            tracing::info!(channels = wanted.len(), "redis subscriber connected");
            backoff = self.backoff_base;

            loop {
                // on_message 流独占借用 pubsub，取出一步后立刻释放，
                // 才能在同一连接上继续调用 subscribe
                let step = {
                    let mut stream = pubsub.on_message();
                    tokio::select! {
                        msg = stream.next() => match msg {
                            Some(msg) => Step::Message(msg),
                            None => Step::Disconnected,
                        },
                        cmd = self.commands.recv() => Step::Command(cmd),
                    }
                };

                match step {
                    Step::Message(msg) => self.dispatch(msg),
                    Step::Disconnected => {
                        tracing::warn!("redis subscriber connection lost");
                        break;
                    }
                    Step::Command(Some(SubscriberCommand::Subscribe(channel))) => {
                        if let Err(err) = pubsub.subscribe(&channel).await {
                            tracing::warn!(channel, error = %err, "subscribe failed");
                            break;
                        }
                        tracing::debug!(channel, "subscribed to room channel");
                    }
                    Step::Command(Some(SubscriberCommand::Shutdown)) | Step::Command(None) => {
                        tracing::info!("redis subscriber shutting down");
                        return;
                    }
                }
            }

            if self.sleep_or_shutdown(backoff).await {
                return;
            }
            backoff = next_backoff(backoff, self.backoff_max);
        }
    }

    /// 退避等待。期间收到的订阅命令直接忽略（频道已登记在共享
    /// 集合里，重连时统一补订），收到关闭返回 true。
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                cmd = self.commands.recv() => match cmd {
                    Some(SubscriberCommand::Subscribe(_)) => {}
                    Some(SubscriberCommand::Shutdown) | None => return true,
                },
            }
        }
    }

    fn dispatch(&self, msg: redis::Msg) {
        let channel = msg.get_channel_name().to_string();
        let Some(room) = channel.strip_prefix(&self.channel_prefix) else {
            tracing::debug!(channel, "ignoring message on foreign channel");
            return;
        };
        let room = match RoomName::parse(room) {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(channel, error = %err, "channel carries invalid room name");
                return;
            }
        };
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(channel, error = %err, "non-text payload on room channel");
                return;
            }
        };
        let event: RoomEvent = match serde_json::from_str(&payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(channel, error = %err, "undecodable room event, dropping");
                return;
            }
        };
        if self.events.send((room, event)).is_err() {
            tracing::debug!("event receiver dropped, discarding broadcast");
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
