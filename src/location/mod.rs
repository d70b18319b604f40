use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bus::{alerts_channel, location_channel};
use crate::cache::keys::location_log_key;
use crate::cache::models::location::LatestLocation;
use crate::cache::operations::family::FamilyCacheOperations;
use crate::cache::operations::geofence::GeofenceCacheOperations;
use crate::cache::operations::location::LocationCacheOperations;
use crate::database::models::Geofence;
use crate::ghost::{mask, GhostModeService};
use crate::storage::{LogEntry, RedisStore};
use crate::utils::{calculate_distance, now_ms};

/// 位置日志软上限条数
const LOG_SOFT_CAP: usize = 10_000;

/// 每隔多少次追加触发一次日志裁剪
const TRIM_INTERVAL: u64 = 128;

/// 历史查询默认条数
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// 客户端上报的位置样本
#[derive(Debug, Clone, Deserialize)]
pub struct LocationSample {
    pub family_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
    /// 客户端时间戳（毫秒）
    pub timestamp: i64,
    /// 电量百分比，缺省按100处理
    pub battery_level: Option<u8>,
    pub battery_state: Option<String>,
}

/// 摄入成功的回执
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub message_id: String,
    pub server_timestamp: i64,
}

/// 历史查询结果，last_id用于游标续读
#[derive(Debug, Serialize)]
pub struct LocationHistory {
    pub locations: Vec<LatestLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
}

/// 位置服务
/// 摄入链路：落日志（必须成功）-> 更新最新位置缓存 -> 广播（尽力而为）
pub struct LocationService {
    store: Arc<RedisStore>,
    locations: Arc<LocationCacheOperations>,
    families: Arc<FamilyCacheOperations>,
    geofences: Arc<GeofenceCacheOperations>,
    ghost: Arc<GhostModeService>,
    append_count: AtomicU64,
}

impl LocationService {
    pub fn new(
        store: Arc<RedisStore>,
        locations: Arc<LocationCacheOperations>,
        families: Arc<FamilyCacheOperations>,
        geofences: Arc<GeofenceCacheOperations>,
        ghost: Arc<GhostModeService>,
    ) -> Self {
        Self {
            store,
            locations,
            families,
            geofences,
            ghost,
            append_count: AtomicU64::new(0),
        }
    }

    /// 摄入一条位置样本
    /// 日志追加失败则整体失败；缓存与广播失败只记录日志
    pub async fn ingest(
        &self,
        user_id: &str,
        sample: LocationSample,
    ) -> Result<IngestReceipt, redis::RedisError> {
        let server_timestamp = now_ms();
        let battery_level = sample.battery_level.unwrap_or(100).min(100);
        let log_key = location_log_key(&sample.family_id);

        // 1. 持久化到家庭位置日志，这是摄入成功与否的唯一判据
        let mut fields: Vec<(&str, String)> = vec![
            ("user_id", user_id.to_string()),
            ("family_id", sample.family_id.clone()),
            ("latitude", sample.latitude.to_string()),
            ("longitude", sample.longitude.to_string()),
            ("accuracy", sample.accuracy.to_string()),
            ("timestamp", sample.timestamp.to_string()),
            ("battery_level", battery_level.to_string()),
            ("server_timestamp", server_timestamp.to_string()),
        ];
        if let Some(altitude) = sample.altitude {
            fields.push(("altitude", altitude.to_string()));
        }
        if let Some(bearing) = sample.bearing {
            fields.push(("bearing", bearing.to_string()));
        }
        if let Some(speed) = sample.speed {
            fields.push(("speed", speed.to_string()));
        }
        if let Some(state) = &sample.battery_state {
            fields.push(("battery_state", state.clone()));
        }

        let message_id = self.store.append(&log_key, &fields).await?;

        // 周期性软上限裁剪
        let count = self.append_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % TRIM_INTERVAL == 0 {
            if let Err(e) = self.store.trim(&log_key, LOG_SOFT_CAP).await {
                tracing::warn!("Log trim failed for {}: {}", log_key, e);
            }
        }

        let latest = LatestLocation {
            user_id: user_id.to_string(),
            family_id: sample.family_id.clone(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            altitude: sample.altitude,
            bearing: sample.bearing,
            speed: sample.speed,
            battery_level,
            battery_state: sample.battery_state.clone(),
            timestamp: sample.timestamp,
            server_timestamp,
        };

        // 2. 围栏判定要用到覆盖前的上一位置
        let previous = self
            .locations
            .get_last_location(user_id, &sample.family_id)
            .await;

        // 3. 更新最新位置缓存
        self.locations.set_last_location(&latest).await;

        // 4. 广播位置更新，发布侧按隐身判定掩码
        self.publish_update(&latest).await;

        // 5. 围栏进出判定
        self.evaluate_geofences(previous.as_ref(), &latest).await;

        Ok(IngestReceipt {
            message_id,
            server_timestamp,
        })
    }

    /// 发布位置更新到家庭位置频道
    async fn publish_update(&self, latest: &LatestLocation) {
        let status = self.ghost.is_ghost(&latest.user_id, &latest.family_id).await;
        let broadcast = if status.enabled {
            mask(latest)
        } else {
            latest.clone()
        };

        let payload = json!({
            "type": "location_update",
            "user_id": broadcast.user_id,
            "family_id": broadcast.family_id,
            "lat": broadcast.latitude,
            "lon": broadcast.longitude,
            "accuracy": broadcast.accuracy,
            "client_ts_ms": broadcast.timestamp,
            "battery_pct": broadcast.battery_level,
            "server_ts_ms": broadcast.server_timestamp,
        });

        let channel = location_channel(&latest.family_id);
        if let Err(e) = self.store.publish(&channel, &payload.to_string()).await {
            tracing::warn!("Publish to {} failed: {}", channel, e);
        }
    }

    /// 对比前后位置与家庭围栏，发布进出告警
    async fn evaluate_geofences(&self, previous: Option<&LatestLocation>, latest: &LatestLocation) {
        let previous = match previous {
            Some(p) => p,
            None => return,
        };

        let geofences = self.geofences.get_geofences(&latest.family_id).await;
        for fence in &geofences {
            if !fence.enabled {
                continue;
            }
            let was_inside = inside(fence, previous.latitude, previous.longitude);
            let is_inside = inside(fence, latest.latitude, latest.longitude);

            let transition = match (was_inside, is_inside) {
                (false, true) => "entered",
                (true, false) => "exited",
                _ => continue,
            };

            let payload = json!({
                "type": "geofence_alert",
                "family_id": latest.family_id,
                "user_id": latest.user_id,
                "geofence_id": fence.id,
                "geofence_name": fence.name,
                "transition": transition,
                "lat": latest.latitude,
                "lon": latest.longitude,
                "server_ts_ms": latest.server_timestamp,
            });

            let channel = alerts_channel(&latest.family_id);
            if let Err(e) = self.store.publish(&channel, &payload.to_string()).await {
                tracing::warn!("Geofence alert publish failed on {}: {}", channel, e);
            }
        }
    }

    /// 范围读取家庭位置历史
    /// 游标推进以原始读取为准，用户过滤不影响last_id
    pub async fn history(
        &self,
        family_id: &str,
        user_filter: Option<&str>,
        limit: usize,
        after_id: &str,
    ) -> Result<LocationHistory, redis::RedisError> {
        let log_key = location_log_key(family_id);
        let entries = self.store.read_log(&log_key, after_id, limit).await?;

        let last_id = entries.last().map(|e| e.id.clone());

        let mut locations: Vec<LatestLocation> = entries
            .iter()
            .filter_map(decode_entry)
            .filter(|loc| user_filter.map_or(true, |uid| loc.user_id == uid))
            .collect();

        // 读出口掩码：日志保留原始坐标，只对当前隐身的成员掩码
        self.mask_at_egress(family_id, &mut locations).await;

        Ok(LocationHistory { locations, last_id })
    }

    /// 家庭全员当前位置，缺失条目直接省略
    pub async fn all_current(&self, family_id: &str) -> Vec<LatestLocation> {
        let members = self.families.get_family_members(family_id).await;
        let member_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();

        let mut locations = self
            .locations
            .get_last_locations(family_id, &member_ids)
            .await;

        self.mask_at_egress(family_id, &mut locations).await;
        locations
    }

    /// 单个成员的当前位置；缓存缺失时扫描日志恢复
    pub async fn latest_location(
        &self,
        family_id: &str,
        user_id: &str,
    ) -> Option<LatestLocation> {
        if let Some(location) = self.locations.get_last_location(user_id, family_id).await {
            let mut locations = vec![location];
            self.mask_at_egress(family_id, &mut locations).await;
            return locations.pop();
        }

        // 缓存缺失，从日志恢复最近一条
        let log_key = location_log_key(family_id);
        let entries = match self.store.read_log(&log_key, "-", LOG_SOFT_CAP).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Log scan failed for {}: {}", log_key, e);
                return None;
            }
        };

        let recovered = entries
            .iter()
            .rev()
            .filter_map(decode_entry)
            .find(|loc| loc.user_id == user_id)?;

        // 恢复的条目回写缓存，避免重复扫描
        self.locations.set_last_location(&recovered).await;

        let mut locations = vec![recovered];
        self.mask_at_egress(family_id, &mut locations).await;
        locations.pop()
    }

    /// 对当前隐身的成员在读出口掩码
    async fn mask_at_egress(&self, family_id: &str, locations: &mut [LatestLocation]) {
        let mut user_ids: Vec<String> = locations.iter().map(|l| l.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();

        for user_id in user_ids {
            let status = self.ghost.is_ghost(&user_id, family_id).await;
            if !status.enabled {
                continue;
            }
            for location in locations.iter_mut() {
                if location.user_id == user_id {
                    *location = mask(location);
                }
            }
        }
    }
}

/// 解码一条日志记录，数值字段为字符串形态
/// 解不出必需字段的记录按损坏跳过
fn decode_entry(entry: &LogEntry) -> Option<LatestLocation> {
    let fields = &entry.fields;

    Some(LatestLocation {
        user_id: fields.get("user_id")?.clone(),
        family_id: fields.get("family_id")?.clone(),
        latitude: fields.get("latitude")?.parse().ok()?,
        longitude: fields.get("longitude")?.parse().ok()?,
        accuracy: fields.get("accuracy")?.parse().ok()?,
        altitude: fields.get("altitude").and_then(|v| v.parse().ok()),
        bearing: fields.get("bearing").and_then(|v| v.parse().ok()),
        speed: fields.get("speed").and_then(|v| v.parse().ok()),
        battery_level: fields
            .get("battery_level")
            .and_then(|v| v.parse().ok())
            .unwrap_or(100),
        battery_state: fields.get("battery_state").cloned(),
        timestamp: fields.get("timestamp")?.parse().ok()?,
        server_timestamp: fields
            .get("server_timestamp")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    })
}

/// 判断坐标是否位于围栏内
fn inside(fence: &Geofence, latitude: f64, longitude: f64) -> bool {
    calculate_distance(fence.center_lat, fence.center_lon, latitude, longitude) <= fence.radius_m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(fields: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            id: "1-1".to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_decode_entry_full() {
        let entry = entry(&[
            ("user_id", "u1"),
            ("family_id", "fA"),
            ("latitude", "12.9716"),
            ("longitude", "77.5946"),
            ("accuracy", "5.0"),
            ("timestamp", "1700000000000"),
            ("battery_level", "78"),
            ("server_timestamp", "1700000000100"),
        ]);

        let loc = decode_entry(&entry).unwrap();
        assert_eq!(loc.user_id, "u1");
        assert_eq!(loc.latitude, 12.9716);
        assert_eq!(loc.longitude, 77.5946);
        assert_eq!(loc.battery_level, 78);
        assert_eq!(loc.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_decode_entry_defaults_battery() {
        let entry = entry(&[
            ("user_id", "u1"),
            ("family_id", "fA"),
            ("latitude", "1.0"),
            ("longitude", "2.0"),
            ("accuracy", "10"),
            ("timestamp", "1700000000000"),
        ]);

        let loc = decode_entry(&entry).unwrap();
        assert_eq!(loc.battery_level, 100);
        assert_eq!(loc.server_timestamp, 0);
    }

    #[test]
    fn test_decode_entry_rejects_missing_coordinates() {
        let entry = entry(&[
            ("user_id", "u1"),
            ("family_id", "fA"),
            ("accuracy", "10"),
            ("timestamp", "1700000000000"),
        ]);
        assert!(decode_entry(&entry).is_none());
    }

    #[test]
    fn test_inside_geofence() {
        let fence = Geofence {
            id: "g1".to_string(),
            family_id: "fA".to_string(),
            name: "家".to_string(),
            center_lat: 39.9042,
            center_lon: 116.4074,
            radius_m: 500.0,
            enabled: true,
        };

        assert!(inside(&fence, 39.9042, 116.4074));
        // 约1.1公里以外
        assert!(!inside(&fence, 39.9142, 116.4074));
    }
}
