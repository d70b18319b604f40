// 记录源适配模块
// 家庭成员关系、地理围栏与隐身模式的权威数据都在外部记录源中，
// 核心只通过类型化查询读写，自身不持有任何权威状态

pub mod client;
pub mod models;
pub mod repositories;

// 重新导出常用类型和函数，方便其他模块使用
pub use client::{RepositoryClient, RepositoryError};
pub use models::{FamilyMember, Geofence, GhostModes, GhostScope, GhostStatus, Role};
pub use repositories::family::FamilyRepository;
pub use repositories::ghost::GhostRepository;
