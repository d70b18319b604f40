use std::sync::Arc;

use crate::cache::keys::{ghost_family_key, ghost_global_key};
use crate::storage::RedisStore;

/// 隐身开关缓存过期时间（秒）
pub const GHOST_CACHE_EXPIRE: u64 = 30 * 86400; // 30天

/// 隐身开关缓存操作
/// 开关以"1"/"0"存储，缺失表示未知而非关闭
pub struct GhostCacheOperations {
    store: Arc<RedisStore>,
    enabled: bool,
}

impl GhostCacheOperations {
    pub fn new(store: Arc<RedisStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// 读取全局隐身开关
    pub async fn get_global_flag(&self, user_id: &str) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let key = ghost_global_key(user_id);
        match self.store.get(&key).await {
            Ok(value) => value.map(|v| v == "1"),
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// 写入全局隐身开关
    pub async fn set_global_flag(&self, user_id: &str, enabled: bool) {
        if !self.enabled {
            return;
        }
        let key = ghost_global_key(user_id);
        let value = if enabled { "1" } else { "0" };
        if let Err(e) = self.store.set(&key, value, Some(GHOST_CACHE_EXPIRE)).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// 读取家庭隐身开关
    pub async fn get_family_flag(&self, user_id: &str, family_id: &str) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let key = ghost_family_key(family_id, user_id);
        match self.store.get(&key).await {
            Ok(value) => value.map(|v| v == "1"),
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// 写入家庭隐身开关
    pub async fn set_family_flag(&self, user_id: &str, family_id: &str, enabled: bool) {
        if !self.enabled {
            return;
        }
        let key = ghost_family_key(family_id, user_id);
        let value = if enabled { "1" } else { "0" };
        if let Err(e) = self.store.set(&key, value, Some(GHOST_CACHE_EXPIRE)).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// 失效用户在所有给定家庭中的隐身开关缓存
    pub async fn invalidate_user(&self, user_id: &str, family_ids: &[String]) {
        if !self.enabled {
            return;
        }
        let mut keys = vec![ghost_global_key(user_id)];
        for family_id in family_ids {
            keys.push(ghost_family_key(family_id, user_id));
        }
        if let Err(e) = self.store.del(&keys).await {
            tracing::warn!("Ghost cache invalidation failed for {}: {}", user_id, e);
        }
    }

    /// 失效一个家庭所有成员的隐身开关缓存
    pub async fn invalidate_family(&self, family_id: &str, member_ids: &[String]) {
        if !self.enabled {
            return;
        }
        let keys: Vec<String> = member_ids
            .iter()
            .map(|uid| ghost_family_key(family_id, uid))
            .collect();
        if let Err(e) = self.store.del(&keys).await {
            tracing::warn!("Ghost cache invalidation failed for {}: {}", family_id, e);
        }
    }
}
