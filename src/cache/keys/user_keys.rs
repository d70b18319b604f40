/// 用户缓存键前缀
const USER_PREFIX: &str = "user:";

/// 生成用户家庭列表缓存键
pub fn user_families_key(user_id: &str) -> String {
    format!("{}{}:families", USER_PREFIX, user_id)
}

/// 生成用户在家庭中的角色缓存键
pub fn user_role_key(user_id: &str, family_id: &str) -> String {
    format!("{}{}:family:{}:role", USER_PREFIX, user_id, family_id)
}

/// 生成用户最新位置缓存键
pub fn last_location_key(user_id: &str, family_id: &str) -> String {
    format!(
        "{}{}:family:{}:last_location",
        USER_PREFIX, user_id, family_id
    )
}

/// 生成用户在线状态缓存键
pub fn online_key(user_id: &str, family_id: &str) -> String {
    format!("{}{}:family:{}:online", USER_PREFIX, user_id, family_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_keys() {
        assert_eq!(user_families_key("u1"), "user:u1:families");
        assert_eq!(user_role_key("u1", "fA"), "user:u1:family:fA:role");
        assert_eq!(
            last_location_key("u1", "fA"),
            "user:u1:family:fA:last_location"
        );
        assert_eq!(online_key("u1", "fA"), "user:u1:family:fA:online");
    }
}
