use std::sync::Arc;

use crate::cache::keys::geofence_key;
use crate::database::models::Geofence;
use crate::database::repositories::family::FamilyRepository;
use crate::storage::RedisStore;

/// 地理围栏缓存过期时间（秒）
pub const GEOFENCE_CACHE_EXPIRE: u64 = 3600; // 1小时

/// 地理围栏缓存操作
pub struct GeofenceCacheOperations {
    store: Arc<RedisStore>,
    repository: Arc<FamilyRepository>,
    enabled: bool,
}

impl GeofenceCacheOperations {
    pub fn new(store: Arc<RedisStore>, repository: Arc<FamilyRepository>, enabled: bool) -> Self {
        Self {
            store,
            repository,
            enabled,
        }
    }

    /// 获取家庭启用中的地理围栏
    pub async fn get_geofences(&self, family_id: &str) -> Vec<Geofence> {
        let key = geofence_key(family_id);

        if self.enabled {
            match self.store.get_json::<Vec<Geofence>>(&key).await {
                Ok(Some(geofences)) => return geofences,
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
            }
        }

        let geofences = match self.repository.geofences_of(family_id).await {
            Ok(geofences) => geofences,
            Err(e) => {
                tracing::error!("Repository geofences_of({}) failed: {}", family_id, e);
                return Vec::new();
            }
        };

        if self.enabled {
            if let Err(e) = self
                .store
                .set_json(&key, &geofences, Some(GEOFENCE_CACHE_EXPIRE))
                .await
            {
                tracing::warn!("Cache write failed for {}: {}", key, e);
            }
        }

        geofences
    }

    /// 失效家庭的围栏缓存
    pub async fn invalidate(&self, family_id: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.store.del(&[geofence_key(family_id)]).await {
            tracing::warn!("Cache invalidation failed for geofence:{}: {}", family_id, e);
        }
    }
}
