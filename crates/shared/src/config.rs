//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 数据库与 Redis 的 URL 为空表示对应组件未启用，服务以降级模式运行。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 为空时禁用 PostgreSQL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// 为空时禁用缓存
    pub url: String,
}

impl RedisConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单条 gRPC 消息的收发上限（字节）
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            max_message_bytes: 50 * 1024 * 1024,
        }
    }
}

/// 规则缓存配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 启用规则 ID 列表的缓存 TTL
    pub list_cache_ttl_secs: u64,
    /// 单条规则的缓存 TTL
    pub rule_cache_ttl_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            list_cache_ttl_secs: 60,
            rule_cache_ttl_secs: 300,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub observability: ObservabilityConfig,
    pub rules: RulesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "telemetryx".to_string(),
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            observability: ObservabilityConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. `.env` 文件（仅注入进程环境变量）
    /// 2. config/default.toml
    /// 3. config/{environment}.toml
    /// 4. config/{service_name}.toml
    /// 5. 环境变量（TELEMETRYX_ 前缀，嵌套用双下划线，如 TELEMETRYX_DATABASE__URL -> database.url）
    /// 6. 兼容的扁平环境变量：DATABASE_URL、REDIS_URL、GRPC_HOST、GRPC_PORT、LOG_LEVEL
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        // .env 不存在时忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("TELEMETRYX_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("TELEMETRYX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// 应用扁平环境变量覆盖
    ///
    /// `lookup` 抽象了环境变量读取，便于测试。
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(host) = lookup("GRPC_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GRPC_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.observability.log_level = level.to_lowercase();
        }
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
