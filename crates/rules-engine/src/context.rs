//! 进程级上下文
//!
//! 持有数据库连接池与 Redis 客户端，进程启动时初始化，关闭时释放。
//! 未配置的组件以 None 表示，服务进入降级模式。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use telemetryx_shared::cache::Cache;
use telemetryx_shared::config::AppConfig;
use telemetryx_shared::database::Database;
use telemetryx_shared::error::{Result, TelemetryError};
use tracing::{error, info, warn};

use crate::repository::{KeyValueCache, PgRuleStore, RulesRepository};

pub struct AppContext {
    config: AppConfig,
    database: Option<Database>,
    cache: Option<Cache>,
    closed: AtomicBool,
}

impl AppContext {
    /// 按配置连接外部依赖
    ///
    /// URL 为空的组件跳过并记录警告；已配置但连接失败时返回错误。
    pub async fn init(config: AppConfig) -> Result<Self> {
        let database = match Database::connect(&config.database).await {
            Ok(db) => Some(db),
            Err(TelemetryError::DatabaseNotConfigured) => {
                warn!("DATABASE_URL not set, running without rule storage");
                None
            }
            Err(e) => {
                error!(
                    code = e.code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to connect to database"
                );
                return Err(e);
            }
        };

        let cache = match Cache::connect(&config.redis).await {
            Ok(cache) => Some(cache),
            Err(TelemetryError::CacheNotConfigured) => {
                warn!("REDIS_URL not set, rule cache disabled");
                None
            }
            Err(e) => {
                error!(
                    code = e.code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to connect to Redis"
                );
                return Err(e);
            }
        };

        Ok(Self::from_parts(config, database, cache))
    }

    pub fn from_parts(config: AppConfig, database: Option<Database>, cache: Option<Cache>) -> Self {
        Self {
            config,
            database,
            cache,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// 构建规则仓储，未配置数据库时返回 None
    pub fn rules_repository(&self) -> Option<RulesRepository> {
        let database = self.database.as_ref()?;
        let store = Arc::new(PgRuleStore::new(database.pool().clone()));
        let cache = self
            .cache
            .clone()
            .map(|c| Arc::new(c) as Arc<dyn KeyValueCache>);

        Some(RulesRepository::new(store, cache).with_ttls(
            Duration::from_secs(self.config.rules.list_cache_ttl_secs),
            Duration::from_secs(self.config.rules.rule_cache_ttl_secs),
        ))
    }

    /// 存储健康状态，未配置存储时视为健康
    pub async fn is_store_healthy(&self) -> bool {
        match &self.database {
            Some(db) => match db.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Database health check failed");
                    false
                }
            },
            None => true,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 释放外部连接，重复调用无副作用
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(db) = &self.database {
            db.close().await;
        }
        info!("Application context closed");
    }
}
