// 缓存键构造
// 每类键一个子模块，保持键格式集中可查

pub mod family_keys;
pub mod ghost_keys;
pub mod user_keys;

pub use family_keys::*;
pub use ghost_keys::*;
pub use user_keys::*;
