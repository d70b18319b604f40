/// 家庭成员列表缓存键前缀
const FAMILY_PREFIX: &str = "family:";

/// 地理围栏缓存键前缀
const GEOFENCE_PREFIX: &str = "geofence:";

/// 家庭位置日志流键前缀
const LOCATION_LOG_PREFIX: &str = "locations:family:";

/// 生成家庭成员列表缓存键
pub fn family_members_key(family_id: &str) -> String {
    format!("{}{}:members", FAMILY_PREFIX, family_id)
}

/// 生成家庭地理围栏缓存键
pub fn geofence_key(family_id: &str) -> String {
    format!("{}{}", GEOFENCE_PREFIX, family_id)
}

/// 生成家庭位置日志流键（无TTL，软上限裁剪）
pub fn location_log_key(family_id: &str) -> String {
    format!("{}{}", LOCATION_LOG_PREFIX, family_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_keys() {
        assert_eq!(family_members_key("fA"), "family:fA:members");
        assert_eq!(geofence_key("fA"), "geofence:fA");
        assert_eq!(location_log_key("fA"), "locations:family:fA");
    }
}
