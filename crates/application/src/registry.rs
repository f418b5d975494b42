use std::collections::{HashMap, HashSet};

use domain::RoomName;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::bus::RoomEvent;

/// 连接会话标识，升级时分配。
pub type ConnectionId = Uuid;

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<RoomEvent>,
    rooms: HashSet<RoomName>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
}

/// 进程内房间成员登记表。
///
/// 记录哪些连接加入了哪些房间，并把总线投递扇出到本地连接。
/// 订阅状态由总线自身持有，这里只管理本地扇出。
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新连接及其出站通道。
    pub async fn connect(&self, id: ConnectionId, sender: mpsc::UnboundedSender<RoomEvent>) {
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            id,
            ConnectionEntry {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// 把连接加入房间。返回 false 表示连接未登记。
    pub async fn join(&self, id: ConnectionId, room: &RoomName) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.get_mut(&id) else {
            return false;
        };
        entry.rooms.insert(room.clone());
        inner.rooms.entry(room.clone()).or_default().insert(id);
        true
    }

    /// 断开连接：从其加入的全部房间移除，不向房间发送任何通知。
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.connections.remove(&id) {
            for room in entry.rooms {
                if let Some(members) = inner.rooms.get_mut(&room) {
                    members.remove(&id);
                    if members.is_empty() {
                        inner.rooms.remove(&room);
                    }
                }
            }
        }
    }

    pub async fn connections_in_room(&self, room: &RoomName) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 把事件投递给房间内每个本地连接，返回成功送达的数量。
    ///
    /// 某个连接的出站通道已关闭不影响其他成员；失效连接当场清理。
    pub async fn deliver(&self, room: &RoomName, event: &RoomEvent) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let inner = self.inner.read().await;
            let Some(members) = inner.rooms.get(room) else {
                return 0;
            };
            for id in members {
                match inner.connections.get(id) {
                    Some(entry) if entry.sender.send(event.clone()).is_ok() => delivered += 1,
                    _ => dead.push(*id),
                }
            }
        }

        for id in dead {
            tracing::debug!(connection = %id, "pruning closed connection from registry");
            self.disconnect(id).await;
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RoomEvent;

    fn room(name: &str) -> RoomName {
        RoomName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn delivers_to_all_room_members_and_nobody_else() {
        let registry = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        registry.connect(a, tx_a).await;
        registry.connect(b, tx_b).await;
        registry.connect(c, tx_c).await;

        assert!(registry.join(a, &room("alpha")).await);
        assert!(registry.join(b, &room("alpha")).await);
        assert!(registry.join(c, &room("beta")).await);

        let event = RoomEvent::system_notice("hello");
        let delivered = registry.deliver(&room("alpha"), &event).await;

        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap(), event);
        assert_eq!(rx_b.recv().await.unwrap(), event);
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_requires_registered_connection() {
        let registry = RoomRegistry::new();
        assert!(!registry.join(Uuid::new_v4(), &room("alpha")).await);
    }

    #[tokio::test]
    async fn disconnect_removes_connection_from_all_rooms() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        registry.connect(id, tx).await;
        registry.join(id, &room("alpha")).await;
        registry.join(id, &room("beta")).await;
        registry.disconnect(id).await;

        assert!(registry.connections_in_room(&room("alpha")).await.is_empty());
        assert!(registry.connections_in_room(&room("beta")).await.is_empty());
    }

    #[tokio::test]
    async fn dead_peer_does_not_block_others() {
        let registry = RoomRegistry::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();

        let live = Uuid::new_v4();
        let dead = Uuid::new_v4();
        registry.connect(live, tx_live).await;
        registry.connect(dead, tx_dead).await;
        registry.join(live, &room("alpha")).await;
        registry.join(dead, &room("alpha")).await;

        drop(rx_dead);

        let event = RoomEvent::system_notice("still here");
        let delivered = registry.deliver(&room("alpha"), &event).await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_live.recv().await.unwrap(), event);
        // 失效连接已被清理
        assert_eq!(registry.connections_in_room(&room("alpha")).await, vec![live]);
    }
}
