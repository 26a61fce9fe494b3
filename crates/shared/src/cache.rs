//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和常用缓存操作封装。所有操作共用一条多路复用连接，
//! `Cache` 的克隆开销很小，可以在任务之间自由传递。

use crate::config::RedisConfig;
use crate::error::{Result, TelemetryError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    conn: MultiplexedConnection,
}

impl Cache {
    /// 连接 Redis
    ///
    /// URL 为空时返回 `CacheNotConfigured`。
    #[instrument(skip(config))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        if !config.is_enabled() {
            return Err(TelemetryError::CacheNotConfigured);
        }

        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis connection established");

        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(TelemetryError::from)
    }

    // ==================== 字符串操作 ====================

    /// 读取原始字符串值
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// 写入原始字符串值，`ttl` 为 `None` 时不过期
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    /// 删除键，返回是否确实删除了数据
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// 检查键是否存在
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    // ==================== JSON 操作 ====================

    /// 读取并反序列化 JSON 值
    #[instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 序列化为 JSON 后写入
    #[instrument(skip(self, value))]
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.set(key, &serialized, ttl).await
    }

    // ==================== 计数器 ====================

    /// 原子递增计数器
    ///
    /// 计数器首次写入（递增后的值等于 `delta`）时设置 TTL，后续递增不刷新过期时间。
    pub async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        let mut conn = self.conn();
        let value: i64 = conn.incr(key, delta).await?;

        if let Some(ttl) = ttl
            && value == delta
        {
            let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        }

        Ok(value)
    }

    // ==================== 哈希操作 ====================

    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn();
        let values: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(values)
    }

    /// 删除哈希字段，返回是否确实删除
    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn();
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }
}
