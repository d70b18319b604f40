use std::sync::Arc;

use crate::cache::keys::{
    family_members_key, geofence_key, ghost_family_key, ghost_global_key, last_location_key,
    online_key, user_families_key, user_role_key,
};
use crate::database::models::{FamilyMember, Role};
use crate::database::repositories::family::FamilyRepository;
use crate::storage::RedisStore;

/// 成员列表缓存过期时间（秒）
pub const MEMBERS_CACHE_EXPIRE: u64 = 3600; // 1小时

/// 用户家庭列表缓存过期时间（秒）
pub const FAMILIES_CACHE_EXPIRE: u64 = 3600; // 1小时

/// 角色缓存过期时间（秒）
pub const ROLE_CACHE_EXPIRE: u64 = 3600; // 1小时

/// 家庭成员关系缓存操作
/// 读穿模式：命中返回，未命中回源记录源并回写；
/// 记录源出错时返回空集，绝不伪造数据，也不缓存未命中
pub struct FamilyCacheOperations {
    store: Arc<RedisStore>,
    repository: Arc<FamilyRepository>,
    enabled: bool,
}

impl FamilyCacheOperations {
    /// 创建家庭缓存操作实例；enabled为false时退化为直查记录源
    pub fn new(store: Arc<RedisStore>, repository: Arc<FamilyRepository>, enabled: bool) -> Self {
        Self {
            store,
            repository,
            enabled,
        }
    }

    /// 获取家庭成员列表
    pub async fn get_family_members(&self, family_id: &str) -> Vec<FamilyMember> {
        let key = family_members_key(family_id);

        // 1. 缓存命中直接返回
        if self.enabled {
            match self.store.get_json::<Vec<FamilyMember>>(&key).await {
                Ok(Some(members)) => return members,
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
            }
        }

        // 2. 未命中回源
        let members = match self.repository.members_of(family_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!("Repository members_of({}) failed: {}", family_id, e);
                return Vec::new();
            }
        };

        // 3. 回写缓存
        if self.enabled {
            if let Err(e) = self
                .store
                .set_json(&key, &members, Some(MEMBERS_CACHE_EXPIRE))
                .await
            {
                tracing::warn!("Cache write failed for {}: {}", key, e);
            }
        }

        members
    }

    /// 获取用户加入的家庭ID列表
    pub async fn get_user_families(&self, user_id: &str) -> Vec<String> {
        let key = user_families_key(user_id);

        if self.enabled {
            match self.store.get_json::<Vec<String>>(&key).await {
                Ok(Some(families)) => return families,
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
            }
        }

        let families = match self.repository.families_of(user_id).await {
            Ok(families) => families,
            Err(e) => {
                tracing::error!("Repository families_of({}) failed: {}", user_id, e);
                return Vec::new();
            }
        };

        if self.enabled {
            if let Err(e) = self
                .store
                .set_json(&key, &families, Some(FAMILIES_CACHE_EXPIRE))
                .await
            {
                tracing::warn!("Cache write failed for {}: {}", key, e);
            }
        }

        families
    }

    /// 获取用户在家庭中的角色
    pub async fn get_role(&self, user_id: &str, family_id: &str) -> Option<Role> {
        let key = user_role_key(user_id, family_id);

        if self.enabled {
            match self.store.get(&key).await {
                Ok(Some(role)) => return Some(Role::parse(&role)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
            }
        }

        let role = match self.repository.role_of(user_id, family_id).await {
            Ok(role) => role?,
            Err(e) => {
                tracing::error!(
                    "Repository role_of({}, {}) failed: {}",
                    user_id,
                    family_id,
                    e
                );
                return None;
            }
        };

        if self.enabled {
            if let Err(e) = self
                .store
                .set(&key, role.as_str(), Some(ROLE_CACHE_EXPIRE))
                .await
            {
                tracing::warn!("Cache write failed for {}: {}", key, e);
            }
        }

        Some(role)
    }

    // ---------- 粒度失效 ----------

    /// 失效家庭成员列表
    pub async fn invalidate_family_members(&self, family_id: &str) {
        self.del(&[family_members_key(family_id)]).await;
    }

    /// 失效用户家庭列表
    pub async fn invalidate_user_families(&self, user_id: &str) {
        self.del(&[user_families_key(user_id)]).await;
    }

    /// 失效用户角色
    pub async fn invalidate_role(&self, user_id: &str, family_id: &str) {
        self.del(&[user_role_key(user_id, family_id)]).await;
    }

    /// 失效后立即重建成员列表，供需要即时新鲜数据的调用方使用
    pub async fn update_family_members(&self, family_id: &str) -> Vec<FamilyMember> {
        self.invalidate_family_members(family_id).await;
        self.get_family_members(family_id).await
    }

    /// 整体刷新一个家庭的派生缓存：成员列表、围栏、各成员角色
    pub async fn refresh_family(&self, family_id: &str) -> Vec<FamilyMember> {
        let mut stale = vec![family_members_key(family_id), geofence_key(family_id)];

        // 旧成员列表里的角色键一并失效
        if self.enabled {
            if let Ok(Some(members)) = self
                .store
                .get_json::<Vec<FamilyMember>>(&family_members_key(family_id))
                .await
            {
                for member in &members {
                    stale.push(user_role_key(&member.user_id, family_id));
                }
            }
        }

        self.del(&stale).await;
        self.get_family_members(family_id).await
    }

    // ---------- 组合失效 ----------

    /// 用户加入家庭后的缓存失效
    pub async fn on_user_joined(&self, family_id: &str, user_id: &str) {
        self.del(&[user_families_key(user_id), family_members_key(family_id)])
            .await;
    }

    /// 用户离开家庭后的缓存失效
    pub async fn on_user_left(&self, family_id: &str, user_id: &str) {
        self.del(&[
            user_families_key(user_id),
            family_members_key(family_id),
            user_role_key(user_id, family_id),
            last_location_key(user_id, family_id),
            online_key(user_id, family_id),
        ])
        .await;
    }

    /// 家庭删除后的缓存失效，member_ids为删除前的成员快照
    pub async fn on_family_deleted(&self, family_id: &str, member_ids: &[String]) {
        let mut stale = vec![family_members_key(family_id), geofence_key(family_id)];

        for user_id in member_ids {
            stale.push(user_role_key(user_id, family_id));
            stale.push(last_location_key(user_id, family_id));
            stale.push(online_key(user_id, family_id));
            stale.push(user_families_key(user_id));
            stale.push(ghost_family_key(family_id, user_id));
        }

        self.del(&stale).await;
    }

    /// 用户删除后的缓存失效，family_ids为删除前的家庭快照
    pub async fn on_user_deleted(&self, user_id: &str, family_ids: &[String]) {
        let mut stale = vec![user_families_key(user_id), ghost_global_key(user_id)];

        for family_id in family_ids {
            stale.push(user_role_key(user_id, family_id));
            stale.push(last_location_key(user_id, family_id));
            stale.push(online_key(user_id, family_id));
            stale.push(ghost_family_key(family_id, user_id));
            stale.push(family_members_key(family_id));
        }

        self.del(&stale).await;
    }

    /// 删除一组缓存键，失效失败只记录日志，由TTL自愈
    async fn del(&self, keys: &[String]) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.store.del(keys).await {
            tracing::warn!("Cache invalidation failed for {:?}: {}", keys, e);
        }
    }
}
