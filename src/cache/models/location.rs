use serde::{Deserialize, Serialize};

/// 最新位置缓存数据模型
/// 也是写入位置日志流之前的完整样本形态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestLocation {
    pub user_id: String,
    pub family_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 定位精度（米）
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// 电量百分比，取值[0,100]
    pub battery_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_state: Option<String>,
    /// 客户端时间戳（毫秒）
    pub timestamp: i64,
    /// 服务端时间戳（毫秒）
    pub server_timestamp: i64,
}
