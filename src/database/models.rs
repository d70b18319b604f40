use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 家庭内角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Head,
    Member,
    Child,
}

impl Role {
    /// 从记录源的字符串解析角色，未知值按普通成员处理
    pub fn parse(value: &str) -> Self {
        match value {
            "head" => Role::Head,
            "child" => Role::Child,
            _ => Role::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Head => "head",
            Role::Member => "member",
            Role::Child => "child",
        }
    }
}

/// 家庭成员
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub user_id: String,
    pub role: Role,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

/// 地理围栏
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    pub enabled: bool,
}

/// 隐身模式的生效范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GhostScope {
    Global,
    Family,
    None,
}

/// 针对某个家庭的隐身判定结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GhostStatus {
    pub enabled: bool,
    pub scope: GhostScope,
}

impl GhostStatus {
    pub fn off() -> Self {
        Self {
            enabled: false,
            scope: GhostScope::None,
        }
    }
}

/// 用户的完整隐身配置：全局开关 + 按家庭开关
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhostModes {
    pub global: bool,
    pub per_family: HashMap<String, bool>,
}

impl GhostModes {
    /// 隐身生效规则：全局开启，或该家庭单独开启
    pub fn effective(&self, family_id: &str) -> bool {
        self.global || self.per_family.get(family_id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_unknown_falls_back_to_member() {
        assert_eq!(Role::parse("head"), Role::Head);
        assert_eq!(Role::parse("child"), Role::Child);
        assert_eq!(Role::parse("member"), Role::Member);
        assert_eq!(Role::parse("owner"), Role::Member);
    }

    #[test]
    fn test_ghost_modes_effective() {
        let mut modes = GhostModes::default();
        assert!(!modes.effective("fA"));

        modes.per_family.insert("fA".to_string(), true);
        assert!(modes.effective("fA"));
        assert!(!modes.effective("fB"));

        modes.global = true;
        assert!(modes.effective("fB"));
    }
}
