use std::sync::Arc;

use crate::cache::keys::{last_location_key, online_key};
use crate::cache::models::location::LatestLocation;
use crate::storage::RedisStore;

/// 最新位置缓存过期时间（秒）
pub const LAST_LOCATION_EXPIRE: u64 = 300; // 5分钟

/// 在线状态过期时间（秒），作为心跳兜底
pub const ONLINE_EXPIRE: u64 = 120; // 2分钟

/// 最新位置与在线状态缓存操作
/// 没有记录源回源路径：缺失条目由调用方扫描位置日志恢复或直接略过
pub struct LocationCacheOperations {
    store: Arc<RedisStore>,
    enabled: bool,
}

impl LocationCacheOperations {
    pub fn new(store: Arc<RedisStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// 写入最新位置
    pub async fn set_last_location(&self, location: &LatestLocation) {
        if !self.enabled {
            return;
        }
        let key = last_location_key(&location.user_id, &location.family_id);
        if let Err(e) = self
            .store
            .set_json(&key, location, Some(LAST_LOCATION_EXPIRE))
            .await
        {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// 读取最新位置
    pub async fn get_last_location(
        &self,
        user_id: &str,
        family_id: &str,
    ) -> Option<LatestLocation> {
        if !self.enabled {
            return None;
        }
        let key = last_location_key(user_id, family_id);
        match self.store.get_json::<LatestLocation>(&key).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// 批量读取多个成员的最新位置，缺失条目直接省略
    pub async fn get_last_locations(
        &self,
        family_id: &str,
        user_ids: &[String],
    ) -> Vec<LatestLocation> {
        if !self.enabled || user_ids.is_empty() {
            return Vec::new();
        }

        let keys: Vec<String> = user_ids
            .iter()
            .map(|uid| last_location_key(uid, family_id))
            .collect();

        let values = match self.store.mget(&keys).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Bulk cache read failed for family {}: {}", family_id, e);
                return Vec::new();
            }
        };

        values
            .into_iter()
            .flatten()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect()
    }

    /// 失效最新位置
    pub async fn invalidate_last_location(&self, user_id: &str, family_id: &str) {
        if !self.enabled {
            return;
        }
        let key = last_location_key(user_id, family_id);
        if let Err(e) = self.store.del(&[key.clone()]).await {
            tracing::warn!("Cache invalidation failed for {}: {}", key, e);
        }
    }

    // ---------- 在线状态 ----------

    /// 标记用户在某家庭中在线
    pub async fn set_online(&self, user_id: &str, family_id: &str) {
        let key = online_key(user_id, family_id);
        if let Err(e) = self.store.set(&key, "1", Some(ONLINE_EXPIRE)).await {
            tracing::warn!("Presence write failed for {}: {}", key, e);
        }
    }

    /// 清除用户在某家庭中的在线标记
    pub async fn clear_online(&self, user_id: &str, family_id: &str) {
        let key = online_key(user_id, family_id);
        if let Err(e) = self.store.del(&[key.clone()]).await {
            tracing::warn!("Presence clear failed for {}: {}", key, e);
        }
    }

    /// 查询用户在某家庭中是否在线
    pub async fn is_online(&self, user_id: &str, family_id: &str) -> bool {
        let key = online_key(user_id, family_id);
        match self.store.exists(&key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("Presence read failed for {}: {}", key, e);
                false
            }
        }
    }
}
