use std::sync::Arc;

use rand::Rng;

use crate::cache::models::location::LatestLocation;
use crate::cache::operations::family::FamilyCacheOperations;
use crate::cache::operations::ghost::GhostCacheOperations;
use crate::database::client::RepositoryError;
use crate::database::models::{GhostScope, GhostStatus};
use crate::database::repositories::ghost::GhostRepository;

/// 掩码位移幅度下限（度），约500米
const MASK_MIN_OFFSET_DEG: f64 = 0.005;

/// 掩码位移幅度上限（度），约1000米
const MASK_MAX_OFFSET_DEG: f64 = 0.010;

/// 掩码后上报的定位精度（米）
const MASK_ACCURACY_M: f64 = 1000.0;

/// 隐身模式服务
/// 判定在广播侧进行：发布前判定并掩码，订阅侧不再做任何处理
/// 扇出判定走管理句柄，用户发起的读写走租户句柄
pub struct GhostModeService {
    cache: Arc<GhostCacheOperations>,
    families: Arc<FamilyCacheOperations>,
    repository: Arc<GhostRepository>,
    tenant: Arc<GhostRepository>,
}

impl GhostModeService {
    pub fn new(
        cache: Arc<GhostCacheOperations>,
        families: Arc<FamilyCacheOperations>,
        repository: Arc<GhostRepository>,
        tenant: Arc<GhostRepository>,
    ) -> Self {
        Self {
            cache,
            families,
            repository,
            tenant,
        }
    }

    /// 判定用户对某个家庭是否隐身
    /// 顺序：全局开关缓存 -> 家庭开关缓存 -> 记录源
    pub async fn is_ghost(&self, user_id: &str, family_id: &str) -> GhostStatus {
        let global = self.cache.get_global_flag(user_id).await;
        if global == Some(true) {
            return GhostStatus {
                enabled: true,
                scope: GhostScope::Global,
            };
        }

        let family = self.cache.get_family_flag(user_id, family_id).await;
        if family == Some(true) {
            return GhostStatus {
                enabled: true,
                scope: GhostScope::Family,
            };
        }

        // 两个开关都有明确的缓存值，无须回源
        if global == Some(false) && family == Some(false) {
            return GhostStatus::off();
        }

        // 缓存未命中，回源记录源
        let status = match self.repository.is_ghost(user_id, family_id).await {
            Ok(status) => status,
            Err(RepositoryError::NotConfigured) => return GhostStatus::off(),
            Err(e) => {
                tracing::error!("Repository is_ghost({}, {}) failed: {}", user_id, family_id, e);
                return GhostStatus::off();
            }
        };

        if status.enabled {
            // 探测完整配置以确定生效范围，并回填缓存
            match self.repository.ghost_modes_of(user_id).await {
                Ok(modes) => {
                    let family_flag = modes.per_family.get(family_id).copied().unwrap_or(false);
                    self.cache.set_global_flag(user_id, modes.global).await;
                    self.cache
                        .set_family_flag(user_id, family_id, family_flag)
                        .await;
                    let scope = if modes.global {
                        GhostScope::Global
                    } else {
                        GhostScope::Family
                    };
                    return GhostStatus {
                        enabled: true,
                        scope,
                    };
                }
                Err(e) => {
                    tracing::error!("Repository ghost_modes_of({}) failed: {}", user_id, e);
                    return status;
                }
            }
        }

        GhostStatus::off()
    }

    /// 写入全局隐身开关；记录源写入失败则整体失败
    pub async fn set_global_ghost(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        self.tenant.set_global_ghost(user_id, enabled).await?;
        self.cache.set_global_flag(user_id, enabled).await;
        Ok(())
    }

    /// 写入家庭隐身开关；记录源写入失败则整体失败
    pub async fn set_family_ghost(
        &self,
        user_id: &str,
        family_id: &str,
        enabled: bool,
    ) -> Result<(), RepositoryError> {
        self.tenant
            .set_family_ghost(user_id, family_id, enabled)
            .await?;
        self.cache.set_family_flag(user_id, family_id, enabled).await;
        Ok(())
    }

    /// 用户查询自己的完整隐身配置；记录源未配置时返回默认关闭
    pub async fn modes_of(&self, user_id: &str) -> crate::database::models::GhostModes {
        match self.tenant.ghost_modes_of(user_id).await {
            Ok(modes) => modes,
            Err(RepositoryError::NotConfigured) => Default::default(),
            Err(e) => {
                tracing::error!("Repository ghost_modes_of({}) failed: {}", user_id, e);
                Default::default()
            }
        }
    }

    /// 失效用户在其所有家庭中的隐身缓存
    pub async fn invalidate_user_entries(&self, user_id: &str) {
        let family_ids = self.families.get_user_families(user_id).await;
        self.cache.invalidate_user(user_id, &family_ids).await;
    }

    /// 失效一个家庭所有成员的隐身缓存
    pub async fn invalidate_family_entries(&self, family_id: &str) {
        let members = self.families.get_family_members(family_id).await;
        let member_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();
        self.cache.invalidate_family(family_id, &member_ids).await;
    }
}

/// 对外广播前的坐标掩码
/// 随机位移幅度在[0.005, 0.010]度之间，方向各向同性，上报精度固定为1000米
pub fn mask(location: &LatestLocation) -> LatestLocation {
    let mut rng = rand::thread_rng();
    let magnitude = rng.gen_range(MASK_MIN_OFFSET_DEG..=MASK_MAX_OFFSET_DEG);
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);

    let mut masked = location.clone();
    masked.latitude = location.latitude + magnitude * angle.sin();
    masked.longitude = location.longitude + magnitude * angle.cos();
    masked.accuracy = MASK_ACCURACY_M;
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LatestLocation {
        LatestLocation {
            user_id: "u1".to_string(),
            family_id: "fA".to_string(),
            latitude: 40.0,
            longitude: -74.0,
            accuracy: 8.0,
            altitude: None,
            bearing: None,
            speed: None,
            battery_level: 55,
            battery_state: None,
            timestamp: 1_700_000_000_000,
            server_timestamp: 1_700_000_000_100,
        }
    }

    #[test]
    fn test_mask_displacement_within_bounds() {
        let location = sample();
        for _ in 0..200 {
            let masked = mask(&location);
            let dlat = masked.latitude - location.latitude;
            let dlon = masked.longitude - location.longitude;
            let displacement = (dlat * dlat + dlon * dlon).sqrt();
            assert!(
                (MASK_MIN_OFFSET_DEG..=MASK_MAX_OFFSET_DEG).contains(&displacement),
                "displacement {} out of range",
                displacement
            );
        }
    }

    #[test]
    fn test_mask_forces_reported_accuracy() {
        let masked = mask(&sample());
        assert_eq!(masked.accuracy, MASK_ACCURACY_M);
    }

    #[test]
    fn test_mask_direction_covers_all_quadrants() {
        let location = sample();
        let mut quadrants = [false; 4];
        for _ in 0..500 {
            let masked = mask(&location);
            let dlat = masked.latitude - location.latitude;
            let dlon = masked.longitude - location.longitude;
            let quadrant = match (dlat >= 0.0, dlon >= 0.0) {
                (true, true) => 0,
                (true, false) => 1,
                (false, true) => 2,
                (false, false) => 3,
            };
            quadrants[quadrant] = true;
        }
        assert!(quadrants.iter().all(|&hit| hit), "direction not isotropic");
    }

    #[test]
    fn test_mask_preserves_identity_fields() {
        let location = sample();
        let masked = mask(&location);
        assert_eq!(masked.user_id, location.user_id);
        assert_eq!(masked.family_id, location.family_id);
        assert_eq!(masked.timestamp, location.timestamp);
        assert_eq!(masked.battery_level, location.battery_level);
    }
}
