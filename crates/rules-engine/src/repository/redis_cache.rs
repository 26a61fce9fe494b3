//! Redis 缓存适配

use async_trait::async_trait;
use std::time::Duration;
use telemetryx_shared::cache::Cache;

use super::traits::KeyValueCache;
use crate::error::Result;

#[async_trait]
impl KeyValueCache for Cache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(Cache::get(self, key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        Ok(Cache::set(self, key, value, Some(ttl)).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Cache::delete(self, key).await?;
        Ok(())
    }
}
