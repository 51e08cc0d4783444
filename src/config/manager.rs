//! # 配置管理器
//!
//! 统一的配置加载入口，支持配置文件与环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use super::{AppConfig, CacheType, RedisConfig};
use crate::error::{RecorderError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 环境变量覆盖前缀
pub const ENV_PREFIX: &str = "SQL_RECORDER_";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 当前配置
    config: AppConfig,
    /// 已应用的环境变量覆盖数量
    override_count: usize,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 优先使用 `SQL_RECORDER_CONFIG_PATH`，否则读取 `config/config.{RUST_ENV}.toml`；
    /// 配置文件不存在时使用默认配置。
    pub fn new() -> Result<Self> {
        let config_file = env::var(format!("{ENV_PREFIX}CONFIG_PATH")).unwrap_or_else(|_| {
            let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
            format!("config/config.{env}.toml")
        });

        Self::from_file(&config_file)
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();

        let mut config = if config_path.exists() {
            Self::load_config_file(config_path)?
        } else {
            lwarn!(
                "system",
                LogStage::Configuration,
                LogComponent::Config,
                "config_file_missing",
                &format!("配置文件不存在，使用默认配置: {}", config_path.display())
            );
            AppConfig::default()
        };

        let overrides = Self::build_env_overrides(env::vars());
        Self::apply_env_overrides(&mut config, &overrides)?;

        config.validate()?;

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_loaded",
            "配置管理器初始化完成",
            cache_type = config.cache.cache_type,
            overrides = overrides.len()
        );

        Ok(Self {
            config,
            override_count: overrides.len(),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 取出配置
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 已应用的环境变量覆盖数量
    #[must_use]
    pub const fn override_count(&self) -> usize {
        self.override_count
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        let config_content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            RecorderError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {e}", path.display()),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射
    ///
    /// 例如: `SQL_RECORDER_SERVER_PORT` -> `server.port`
    pub fn build_env_overrides(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        let overrides: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .filter(|rest| *rest != "CONFIG_PATH")
                    .map(|rest| (rest.to_lowercase().replace('_', "."), value))
            })
            .collect();

        ldebug!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "env_overrides",
            &format!("发现 {} 个环境变量覆盖", overrides.len())
        );
        overrides
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将单个覆盖项应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["server", "bind", "address"] | ["server", "bindaddress"] => {
                config.server.bind_address = value.to_string();
            }
            ["server", "port"] => config.server.port = parse_value(path, value)?,
            ["server", "enable", "cors"] => config.server.enable_cors = parse_value(path, value)?,
            ["server", "api", "prefix"] => config.server.api_prefix = value.to_string(),
            ["database", "url"] => config.database.url = value.to_string(),
            ["database", "max", "connections"] | ["database", "maxconnections"] => {
                config.database.max_connections = parse_value(path, value)?;
            }
            ["cache", "type"] | ["cache", "cache", "type"] => {
                config.cache.cache_type = match value.to_lowercase().as_str() {
                    "memory" => CacheType::Memory,
                    "redis" => CacheType::Redis,
                    other => {
                        return Err(RecorderError::config(format!("未知的缓存类型: {other}")));
                    }
                };
            }
            ["cache", "namespace"] => config.cache.namespace = value.to_string(),
            ["redis", "url"] | ["cache", "redis", "url"] => {
                config
                    .cache
                    .redis
                    .get_or_insert_with(RedisConfig::default)
                    .url = value.to_string();
            }
            ["recorder", "capture", "stack"] => {
                config.recorder.capture_stack = parse_value(path, value)?;
            }
            ["recorder", "max", "stack", "lines"] => {
                config.recorder.max_stack_lines = parse_value(path, value)?;
            }
            ["recorder", "format", "queries"] => {
                config.recorder.format_queries = parse_value(path, value)?;
            }
            ["recorder", "async", "dump"] => config.recorder.async_dump = parse_value(path, value)?,
            ["recorder", "max", "form", "bytes"] => {
                config.recorder.max_form_bytes = parse_value(path, value)?;
            }
            ["recorder", "event", "channel"] => config.recorder.event_channel = value.to_string(),
            _ => {
                lwarn!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "unknown_override",
                    &format!("未知的配置路径，忽略环境变量覆盖: {path}")
                );
            }
        }

        Ok(())
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| {
        RecorderError::config_with_source(format!("无效的配置值 {path} = {value}"), e)
    })
}
