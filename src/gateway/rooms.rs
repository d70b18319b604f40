use std::collections::HashMap;

use parking_lot::RwLock;

use tokio::sync::mpsc;

/// 出站帧发送端，每个socket一条无界通道
/// 总线回调经由它投递，不会被慢速socket阻塞
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// 生成家庭房间名
pub fn family_room(family_id: &str) -> String {
    format!("family:{}", family_id)
}

/// 房间注册表：扇出寻址单元
/// 成员按socket计，同一用户的多条连接分别加入
/// 只做内存簿记，所有方法都不挂起
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashMap<String, OutboundSender>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// socket加入房间
    pub fn join(&self, room: &str, socket_id: &str, sender: OutboundSender) {
        let mut rooms = self.rooms.write();
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(socket_id.to_string(), sender);
    }

    /// socket离开房间
    pub fn leave(&self, room: &str, socket_id: &str) {
        let mut rooms = self.rooms.write();
        if let Some(members) = rooms.get_mut(room) {
            members.remove(socket_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// 广播一帧到房间内所有socket，返回投递数
    /// 先快照发送端集合再投递，避免持锁发送
    pub fn broadcast(&self, room: &str, frame: &str) -> usize {
        let senders: Vec<OutboundSender> = {
            let rooms = self.rooms.read();
            match rooms.get(room) {
                Some(members) => members.values().cloned().collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for sender in senders {
            // 发送失败说明对应socket已关闭，交由会话清理
            if sender.send(frame.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// 广播并排除一个socket（事件发起方通常已有直接回执）
    pub fn broadcast_except(&self, room: &str, frame: &str, skip_socket_id: &str) -> usize {
        let senders: Vec<(String, OutboundSender)> = {
            let rooms = self.rooms.read();
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (socket_id, sender) in senders {
            if socket_id == skip_socket_id {
                continue;
            }
            if sender.send(frame.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// 清空房间，返回被移出的socket ID
    pub fn drain_room(&self, room: &str) -> Vec<String> {
        let mut rooms = self.rooms.write();
        match rooms.remove(room) {
            Some(members) => members.into_keys().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_broadcast_leave() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.join("family:fA", "s1", tx1);
        registry.join("family:fA", "s2", tx2);

        assert_eq!(registry.broadcast("family:fA", "hello"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "hello");
        assert_eq!(rx2.try_recv().unwrap(), "hello");

        registry.leave("family:fA", "s1");
        assert_eq!(registry.broadcast("family:fA", "again"), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "again");
    }

    #[test]
    fn test_broadcast_except_skips_origin() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.join("family:fA", "s1", tx1);
        registry.join("family:fA", "s2", tx2);

        assert_eq!(registry.broadcast_except("family:fA", "x", "s1"), 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "x");
    }

    #[test]
    fn test_drain_room() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("family:fA", "s1", tx);

        let drained = registry.drain_room("family:fA");
        assert_eq!(drained, vec!["s1".to_string()]);
        assert_eq!(registry.broadcast("family:fA", "x"), 0);
    }

    #[test]
    fn test_broadcast_empty_room() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast("family:none", "x"), 0);
    }
}
