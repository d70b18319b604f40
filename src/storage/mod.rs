// 存储模块
// 包含KV/流存储客户端与发布订阅通道

pub mod pubsub;
pub mod redis;

// 重新导出常用类型，方便其他模块使用
pub use pubsub::{ChannelMessage, PubSubHub, SubscriberCallback};
pub use self::redis::{LogEntry, RedisStore};
