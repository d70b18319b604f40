// 缓存模块
// 记录源之上的读穿缓存，包含键构造、缓存数据结构和操作逻辑
// 所有缓存都是派生数据，可随时失效重建

pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型和函数，方便其他模块使用
pub use models::location::LatestLocation;
pub use operations::family::FamilyCacheOperations;
pub use operations::ghost::GhostCacheOperations;
pub use operations::location::LocationCacheOperations;
