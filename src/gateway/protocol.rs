use serde::{Deserialize, Serialize};

use crate::location::LocationSample;

/// 隐身模式指令的作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GhostModeScope {
    Global,
    Family,
}

/// 位置上报负载，字段名与移动端线上格式一致
#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdatePayload {
    pub family_id: String,
    pub lat: f64,
    pub lon: f64,
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    pub client_ts_ms: i64,
    #[serde(default)]
    pub battery_pct: Option<u8>,
    #[serde(default)]
    pub battery_state: Option<String>,
}

impl LocationUpdatePayload {
    /// 转换为位置服务的样本形态
    pub fn into_sample(self) -> LocationSample {
        LocationSample {
            family_id: self.family_id,
            latitude: self.lat,
            longitude: self.lon,
            accuracy: self.accuracy,
            altitude: self.altitude,
            bearing: self.bearing,
            speed: self.speed,
            timestamp: self.client_ts_ms,
            battery_level: self.battery_pct,
            battery_state: self.battery_state,
        }
    }
}

/// 客户端入站事件
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 连接后补交令牌（未在头或查询串携带时）
    Auth { token: String },
    LocationUpdate(LocationUpdatePayload),
    Ping,
    JoinFamily {
        family_id: String,
    },
    LeaveFamily {
        family_id: String,
    },
    GhostMode {
        enabled: bool,
        scope: GhostModeScope,
        #[serde(default)]
        family_id: Option<String>,
    },
    UserAddedToFamily {
        family_id: String,
        added_user_id: String,
        #[serde(default)]
        role: Option<String>,
    },
    UserRemovedFromFamily {
        family_id: String,
        removed_user_id: String,
    },
    FamilyDeleted {
        family_id: String,
    },
    MemberRoleUpdated {
        family_id: String,
        user_id: String,
        new_role: String,
    },
    RefreshFamilyCache {
        family_id: String,
    },
}

/// 网关直发给客户端的事件
/// 经总线转发的广播不在此列，原样透传
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 认证完成
    Connected {
        user_id: String,
        family_ids: Vec<String>,
    },
    Pong {
        server_ts_ms: i64,
    },
    /// 入站事件的统一回执
    Ack {
        verb: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        server_ts_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        family_id: Option<String>,
    },
}

impl ServerEvent {
    pub fn ack_ok(verb: &str) -> Self {
        ServerEvent::Ack {
            verb: verb.to_string(),
            success: true,
            error: None,
            message: None,
            server_ts_ms: None,
            family_id: None,
        }
    }

    pub fn ack_err(verb: &str, error: &str) -> Self {
        ServerEvent::Ack {
            verb: verb.to_string(),
            success: false,
            error: Some(error.to_string()),
            message: None,
            server_ts_ms: None,
            family_id: None,
        }
    }

    /// 序列化为文本帧，失败时退化为最小错误帧
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"ack","verb":"unknown","success":false,"error":"serialization"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_update_parse() {
        let json = r#"{
            "type": "location_update",
            "family_id": "fA",
            "lat": 40.0,
            "lon": -74.0,
            "accuracy": 8.0,
            "client_ts_ms": 1700000000000,
            "battery_pct": 55
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::LocationUpdate(payload) => {
                assert_eq!(payload.family_id, "fA");
                assert_eq!(payload.lat, 40.0);
                assert_eq!(payload.lon, -74.0);
                assert_eq!(payload.battery_pct, Some(55));
                assert!(payload.battery_state.is_none());
            }
            _ => panic!("Expected LocationUpdate"),
        }
    }

    #[test]
    fn test_ghost_mode_parse() {
        let json = r#"{"type":"ghost_mode","enabled":true,"scope":"global"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::GhostMode {
                enabled,
                scope,
                family_id,
            } => {
                assert!(enabled);
                assert_eq!(scope, GhostModeScope::Global);
                assert!(family_id.is_none());
            }
            _ => panic!("Expected GhostMode"),
        }
    }

    #[test]
    fn test_ping_parse() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
    }

    #[test]
    fn test_malformed_event_rejected() {
        // scope取值非法
        let json = r#"{"type":"ghost_mode","enabled":true,"scope":"everyone"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
        // 缺少必填字段
        let json = r#"{"type":"join_family"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_server_event_frame_shape() {
        let frame = ServerEvent::Connected {
            user_id: "u1".to_string(),
            family_ids: vec!["fA".to_string()],
        }
        .to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["user_id"], "u1");

        let frame = ServerEvent::ack_err("join_family", "Unauthorized family access").to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Unauthorized family access");
    }
}
