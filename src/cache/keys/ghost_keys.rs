/// 隐身模式缓存键前缀
const GHOST_PREFIX: &str = "ghost:";

/// 生成全局隐身开关缓存键
pub fn ghost_global_key(user_id: &str) -> String {
    format!("{}global:{}", GHOST_PREFIX, user_id)
}

/// 生成家庭隐身开关缓存键
pub fn ghost_family_key(family_id: &str, user_id: &str) -> String {
    format!("{}family:{}:{}", GHOST_PREFIX, family_id, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ghost_keys() {
        assert_eq!(ghost_global_key("u1"), "ghost:global:u1");
        assert_eq!(ghost_family_key("fA", "u1"), "ghost:family:fA:u1");
    }
}
