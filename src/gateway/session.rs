use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::gateway::rooms::OutboundSender;

/// 单条socket连接的会话状态
/// families是认证时解析的家庭集合，joined是当前已加入的房间家庭集合；
/// 成员变更事件命中本会话用户时两者会被就地刷新
#[derive(Clone)]
pub struct SocketHandle {
    pub user_id: String,
    pub sender: OutboundSender,
    pub families: Arc<RwLock<HashSet<String>>>,
    pub joined: Arc<RwLock<HashSet<String>>>,
}

impl SocketHandle {
    /// socket是否有权访问该家庭
    pub fn authorized(&self, family_id: &str) -> bool {
        self.families.read().contains(family_id)
    }
}

/// 会话注册表
/// connected_users只在会话生命周期出入口变更，读取方每次发送前取一致快照
pub struct SessionRegistry {
    sockets: RwLock<HashMap<String, SocketHandle>>,
    users: RwLock<HashMap<String, HashSet<String>>>,
    /// (user_id, family_id) -> 已加入房间的socket数，在线状态按并集计
    presence: RwLock<HashMap<(String, String), usize>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            presence: RwLock::new(HashMap::new()),
        }
    }

    /// 登记一条已认证的socket
    pub fn register(&self, socket_id: &str, handle: SocketHandle) {
        self.users
            .write()
            .entry(handle.user_id.clone())
            .or_default()
            .insert(socket_id.to_string());
        self.sockets
            .write()
            .insert(socket_id.to_string(), handle);
    }

    /// 注销socket，返回其会话状态供断开清理
    pub fn unregister(&self, socket_id: &str) -> Option<SocketHandle> {
        let handle = self.sockets.write().remove(socket_id)?;

        let mut users = self.users.write();
        if let Some(socket_ids) = users.get_mut(&handle.user_id) {
            socket_ids.remove(socket_id);
            if socket_ids.is_empty() {
                users.remove(&handle.user_id);
            }
        }
        Some(handle)
    }

    pub fn get(&self, socket_id: &str) -> Option<SocketHandle> {
        self.sockets.read().get(socket_id).cloned()
    }

    /// 用户的所有socket快照
    pub fn sockets_of(&self, user_id: &str) -> Vec<(String, SocketHandle)> {
        let socket_ids: Vec<String> = {
            let users = self.users.read();
            match users.get(user_id) {
                Some(ids) => ids.iter().cloned().collect(),
                None => return Vec::new(),
            }
        };

        let sockets = self.sockets.read();
        socket_ids
            .into_iter()
            .filter_map(|id| sockets.get(&id).map(|h| (id.clone(), h.clone())))
            .collect()
    }

    /// 投递一帧到用户的所有socket
    pub fn send_to_user(&self, user_id: &str, frame: &str) -> usize {
        let mut delivered = 0;
        for (_, handle) in self.sockets_of(user_id) {
            if handle.sender.send(frame.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// 记录一次房间加入，返回是否该用户在该家庭的首条socket
    pub fn presence_join(&self, user_id: &str, family_id: &str) -> bool {
        let mut presence = self.presence.write();
        let count = presence
            .entry((user_id.to_string(), family_id.to_string()))
            .or_insert(0);
        *count += 1;
        *count == 1
    }

    /// 记录一次房间离开，返回是否该用户在该家庭的最后一条socket
    pub fn presence_leave(&self, user_id: &str, family_id: &str) -> bool {
        let mut presence = self.presence.write();
        let key = (user_id.to_string(), family_id.to_string());
        match presence.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                presence.remove(&key);
                true
            }
            // 从未加入过，不触发下线广播
            None => false,
        }
    }

    /// 直接清除在线计数，用于成员被移出家庭等无须下线广播的场景
    pub fn presence_clear(&self, user_id: &str, family_id: &str) {
        self.presence
            .write()
            .remove(&(user_id.to_string(), family_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user_id: &str) -> (SocketHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SocketHandle {
                user_id: user_id.to_string(),
                sender: tx,
                families: Arc::new(RwLock::new(HashSet::new())),
                joined: Arc::new(RwLock::new(HashSet::new())),
            },
            rx,
        )
    }

    #[test]
    fn test_presence_union_across_sockets() {
        let registry = SessionRegistry::new();

        // 同一用户两条socket：只有第一条触发上线、最后一条触发下线
        assert!(registry.presence_join("u1", "fA"));
        assert!(!registry.presence_join("u1", "fA"));
        assert!(!registry.presence_leave("u1", "fA"));
        assert!(registry.presence_leave("u1", "fA"));

        // 再离开一次不会误报
        assert!(!registry.presence_leave("u1", "fA"));
    }

    #[test]
    fn test_send_to_user_hits_all_sockets() {
        let registry = SessionRegistry::new();
        let (h1, mut rx1) = handle("u1");
        let (h2, mut rx2) = handle("u1");
        let (h3, mut rx3) = handle("u2");

        registry.register("s1", h1);
        registry.register("s2", h2);
        registry.register("s3", h3);

        assert_eq!(registry.send_to_user("u1", "ping"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "ping");
        assert_eq!(rx2.try_recv().unwrap(), "ping");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_unregister_cleans_user_index() {
        let registry = SessionRegistry::new();
        let (h1, _rx1) = handle("u1");
        registry.register("s1", h1);

        assert!(registry.unregister("s1").is_some());
        assert!(registry.get("s1").is_none());
        assert_eq!(registry.send_to_user("u1", "x"), 0);
        assert!(registry.unregister("s1").is_none());
    }

    #[test]
    fn test_authorized_reflects_shared_set() {
        let (handle, _rx) = handle("u1");
        assert!(!handle.authorized("fA"));
        handle.families.write().insert("fA".to_string());
        assert!(handle.authorized("fA"));
    }
}
