use std::collections::HashMap;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client as RedisClient};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 日志流中的一条记录
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// 服务端分配的单调递增ID
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// KV/流存储客户端
/// 持有两条独立连接：普通命令连接与发布专用连接
/// （订阅连接由 PubSubHub 单独维护，发布订阅连接不能与普通命令复用）
#[derive(Clone)]
pub struct RedisStore {
    command: MultiplexedConnection,
    publisher: MultiplexedConnection,
}

impl RedisStore {
    /// 建立命令连接与发布连接，并逐一PING确认可用
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = RedisClient::open(redis_url)?;

        let mut command = client.get_multiplexed_async_connection().await?;
        let mut publisher = client.get_multiplexed_async_connection().await?;

        // 任一连接不可用则阻塞服务就绪
        let _: String = redis::cmd("PING").query_async(&mut command).await?;
        let _: String = redis::cmd("PING").query_async(&mut publisher).await?;

        Ok(Self { command, publisher })
    }

    // ---------- 基础KV操作 ----------

    /// 读取字符串值
    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.command.clone();
        conn.get(key).await
    }

    /// 写入字符串值，可选TTL（秒）
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.command.clone();
        match ttl_secs {
            Some(ttl) => conn.set_ex(key, value, ttl).await,
            None => conn.set(key, value).await,
        }
    }

    /// 读取并反序列化JSON值
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, redis::RedisError> {
        match self.get(key).await? {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "反序列化错误",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 序列化为JSON后写入，可选TTL（秒）
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> Result<(), redis::RedisError> {
        let json = serde_json::to_string(value).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;
        self.set(key, &json, ttl_secs).await
    }

    /// 删除一个或多个键
    pub async fn del(&self, keys: &[String]) -> Result<(), redis::RedisError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.command.clone();
        conn.del(keys).await
    }

    /// 判断键是否存在
    pub async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.command.clone();
        conn.exists(key).await
    }

    /// 自增计数器，返回自增后的值
    pub async fn incr(&self, key: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.command.clone();
        conn.incr(key, 1).await
    }

    /// 设置键的过期时间（秒）
    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), redis::RedisError> {
        let mut conn = self.command.clone();
        conn.expire(key, ttl_secs).await
    }

    /// 批量读取
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, redis::RedisError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.command.clone();
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut conn).await
    }

    /// 批量写入
    pub async fn mset(&self, pairs: &[(String, String)]) -> Result<(), redis::RedisError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut conn = self.command.clone();
        let mut cmd = redis::cmd("MSET");
        for (key, value) in pairs {
            cmd.arg(key).arg(value);
        }
        cmd.query_async(&mut conn).await
    }

    // ---------- 追加日志流操作 ----------

    /// 追加一条记录到命名日志流，返回服务端分配的单调ID
    pub async fn append(
        &self,
        log_key: &str,
        fields: &[(&str, String)],
    ) -> Result<String, redis::RedisError> {
        let mut conn = self.command.clone();
        conn.xadd(log_key, "*", fields).await
    }

    /// 范围读取日志流
    /// after_id为"-"时从头读取，否则从指定ID之后（不含）开始
    pub async fn read_log(
        &self,
        log_key: &str,
        after_id: &str,
        count: usize,
    ) -> Result<Vec<LogEntry>, redis::RedisError> {
        let mut conn = self.command.clone();

        let start = if after_id == "-" {
            "-".to_string()
        } else {
            // 开区间起点，跳过游标本身
            format!("({}", after_id)
        };

        let reply: StreamRangeReply = conn.xrange_count(log_key, start, "+", count).await?;

        Ok(reply.ids.into_iter().map(stream_id_to_entry).collect())
    }

    /// 创建竞争消费组，组已存在时静默成功
    pub async fn create_group(
        &self,
        log_key: &str,
        group: &str,
        start_id: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.command.clone();
        let result: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(log_key, group, start_id).await;

        match result {
            Ok(()) => Ok(()),
            // 组已存在：幂等处理
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 以竞争消费者身份读取日志流
    pub async fn read_group(
        &self,
        log_key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<LogEntry>, redis::RedisError> {
        let mut conn = self.command.clone();

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);

        let reply: StreamReadReply = conn.xread_options(&[log_key], &[">"], &options).await?;

        let mut entries = Vec::new();
        for stream in reply.keys {
            for id in stream.ids {
                entries.push(stream_id_to_entry(id));
            }
        }
        Ok(entries)
    }

    /// 确认消费组内的一条记录
    pub async fn ack(
        &self,
        log_key: &str,
        group: &str,
        id: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.command.clone();
        let _: i64 = conn.xack(log_key, group, &[id]).await?;
        Ok(())
    }

    /// 软上限裁剪日志流长度
    pub async fn trim(&self, log_key: &str, max_len: usize) -> Result<(), redis::RedisError> {
        let mut conn = self.command.clone();
        let _: i64 = conn.xtrim(log_key, StreamMaxlen::Approx(max_len)).await?;
        Ok(())
    }

    // ---------- 发布 ----------

    /// 单次发布，走发布专用连接
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.publisher.clone();
        conn.publish(channel, payload).await
    }
}

/// 将流记录转换为LogEntry，字段值统一转为字符串
fn stream_id_to_entry(id: redis::streams::StreamId) -> LogEntry {
    let mut fields = HashMap::new();
    for (key, value) in id.map {
        if let Ok(s) = redis::from_redis_value::<String>(&value) {
            fields.insert(key, s);
        }
    }
    LogEntry { id: id.id, fields }
}
