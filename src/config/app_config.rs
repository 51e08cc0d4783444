//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

use crate::ensure;
use crate::error::{RecorderError, Result};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 宿主数据库配置
    pub database: super::DatabaseConfig,
    /// 共享存储配置（开关与追踪记录）
    pub cache: CacheConfig,
    /// 录制器行为配置
    pub recorder: RecorderConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 是否启用CORS
    pub enable_cors: bool,
    /// API前缀
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9090,
            enable_cors: true,
            api_prefix: "/api".to_string(),
        }
    }
}

/// 缓存类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// 内存缓存（单进程）
    #[default]
    Memory,
    /// Redis缓存（跨进程共享）
    Redis,
}

/// 缓存配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存类型
    pub cache_type: CacheType,
    /// 键前缀，多个部署共用一个 Redis 时用于隔离
    pub namespace: String,
    /// Redis 缓存配置
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 连接超时时间（秒）
    pub connection_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connection_timeout: 10,
        }
    }
}

/// 录制器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// 是否为每次调用抓取调用栈
    pub capture_stack: bool,
    /// 调用栈最多保留的行数
    pub max_stack_lines: usize,
    /// 是否美化 SQL 文本（关键字大写 + 分句换行）
    pub format_queries: bool,
    /// 是否把持久化与通知放到后台任务执行
    pub async_dump: bool,
    /// 表单请求体最大缓冲字节数
    pub max_form_bytes: usize,
    /// 实时通知频道名
    pub event_channel: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capture_stack: true,
            max_stack_lines: 80,
            format_queries: true,
            async_dump: false,
            max_form_bytes: 64 * 1024,
            event_channel: "recorder-events".to_string(),
        }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure!(self.server.port != 0, Config, "Server port must be greater than 0");
        ensure!(
            self.server.bind_address.parse::<std::net::IpAddr>().is_ok(),
            Config,
            "Invalid bind address: {}",
            self.server.bind_address
        );
        ensure!(self.server.api_prefix.starts_with('/'), Config, "api_prefix must start with '/'");

        ensure!(!self.database.url.is_empty(), Config, "Database URL cannot be empty");
        ensure!(
            self.database.max_connections > 0,
            Config,
            "Database max_connections must be greater than 0"
        );

        match self.cache.cache_type {
            CacheType::Memory => {
                ensure!(
                    self.cache.redis.is_none(),
                    Config,
                    "cache.redis 配置仅在 cache_type = \"redis\" 时可用"
                );
            }
            CacheType::Redis => {
                let redis = self
                    .cache
                    .redis
                    .as_ref()
                    .ok_or_else(|| RecorderError::config("Redis cache configuration must be provided"))?;
                ensure!(!redis.url.is_empty(), Config, "Redis URL cannot be empty");
            }
        }

        ensure!(
            !self.recorder.event_channel.is_empty(),
            Config,
            "recorder.event_channel cannot be empty"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.cache_type, CacheType::Memory);
        assert!(!config.recorder.async_dump);
    }

    #[test]
    fn test_redis_requires_section() {
        let mut config = AppConfig::default();
        config.cache.cache_type = CacheType::Redis;
        assert!(config.validate().is_err());

        config.cache.redis = Some(RedisConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_rejects_redis_section() {
        let mut config = AppConfig::default();
        config.cache.redis = Some(RedisConfig::default());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RecorderError::Config { .. }));
        assert!(err.to_string().contains("cache.redis"));
    }

    #[test]
    fn test_invalid_bind_address_is_config_error() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-ip".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RecorderError::Config { .. }));
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 8088

            [recorder]
            capture_stack = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.api_prefix, "/api");
        assert!(!config.recorder.capture_stack);
        assert!(config.recorder.format_queries);
    }
}
