//! # 缓存抽象层
//!
//! 提供统一的共享键值存储接口，支持内存缓存和Redis缓存。
//! 录制开关与两级追踪存储都建立在这一层之上。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

use super::keys::CacheKey;
use crate::config::{CacheConfig, CacheType, RedisConfig};
use crate::error::{RecorderError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 缓存抽象trait
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// 获取普通键的值
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// 设置普通键的值
    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync;

    /// 删除键（普通键或哈希），返回是否确实删除
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 读取哈希中的单个字段
    async fn hget<T>(&self, key: &str, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// 写入哈希中的单个字段，已存在则覆盖
    async fn hset<T>(&self, key: &str, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync;

    /// 读取整个哈希
    async fn hgetall<T>(&self, key: &str) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send;

    /// 连通性检查
    async fn ping(&self) -> Result<()>;
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| RecorderError::cache_with_source("序列化缓存值失败", e))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| RecorderError::cache_with_source("反序列化缓存值失败", e))
}

/// 内存缓存实现
///
/// 仅在单进程内共享，适合开发环境和测试。
#[derive(Debug, Default)]
pub struct MemoryCache {
    values: RwLock<HashMap<String, String>>,
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let values = self.values.read().await;
        values.get(key).map(|raw| decode(raw)).transpose()
    }

    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let encoded = encode(value)?;
        self.values.write().await.insert(key.to_string(), encoded);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed_value = self.values.write().await.remove(key).is_some();
        let removed_hash = self.hashes.write().await.remove(key).is_some();
        Ok(removed_value || removed_hash)
    }

    async fn hget<T>(&self, key: &str, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let hashes = self.hashes.read().await;
        hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .map(|raw| decode(raw))
            .transpose()
    }

    async fn hset<T>(&self, key: &str, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let encoded = encode(value)?;
        self.hashes
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), encoded);
        Ok(())
    }

    async fn hgetall<T>(&self, key: &str) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        let hashes = self.hashes.read().await;
        hashes.get(key).map_or_else(
            || Ok(HashMap::new()),
            |hash| {
                hash.iter()
                    .map(|(field, raw)| decode(raw).map(|value| (field.clone(), value)))
                    .collect()
            },
        )
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis缓存实现
///
/// 多个服务进程共享同一个 Redis 时，开关与追踪记录对所有进程立即可见。
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// 建立 Redis 连接
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::Cache,
            "connect_to_redis",
            &format!("正在连接 Redis 服务器: {}", config.url)
        );

        let client = Client::open(config.url.as_str())
            .map_err(|e| RecorderError::cache_with_source("创建 Redis 客户端失败", e))?;

        let connection = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|e| RecorderError::cache_with_source("连接 Redis 超时", e))?
        .map_err(|e| RecorderError::cache_with_source("建立 Redis 连接失败", e))?;

        linfo!("system", LogStage::Cache, LogComponent::Cache, "redis_connected", "Redis 连接建立成功");

        Ok(Self { connection })
    }

    /// 获取连接管理器的副本（发布通知复用同一连接）
    #[must_use]
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| RecorderError::cache_with_source(format!("获取缓存失败: {key}"), e))?;
        raw.as_deref().map(decode).transpose()
    }

    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let encoded = encode(value)?;
        let mut conn = self.connection.clone();
        let (): () = conn
            .set(key, encoded)
            .await
            .map_err(|e| RecorderError::cache_with_source(format!("设置缓存失败: {key}"), e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| RecorderError::cache_with_source(format!("删除缓存失败: {key}"), e))?;
        Ok(deleted > 0)
    }

    async fn hget<T>(&self, key: &str, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.hget(key, field).await.map_err(|e| {
            RecorderError::cache_with_source(format!("读取哈希字段失败: {key}.{field}"), e)
        })?;
        raw.as_deref().map(decode).transpose()
    }

    async fn hset<T>(&self, key: &str, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let encoded = encode(value)?;
        let mut conn = self.connection.clone();
        let (): () = conn.hset(key, field, encoded).await.map_err(|e| {
            RecorderError::cache_with_source(format!("写入哈希字段失败: {key}.{field}"), e)
        })?;
        Ok(())
    }

    async fn hgetall<T>(&self, key: &str) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| RecorderError::cache_with_source(format!("读取哈希失败: {key}"), e))?;
        raw.into_iter()
            .map(|(field, raw)| decode(&raw).map(|value| (field, value)))
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| RecorderError::cache_with_source("Redis ping 失败", e))?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(RecorderError::cache(format!("Redis ping 响应异常: {response}")))
        }
    }
}

/// 缓存提供者枚举 - 避免 trait object 兼容性问题
pub enum CacheProviderType {
    Memory(MemoryCache),
    Redis(RedisCache),
}

impl CacheProviderType {
    /// 获取普通键的值
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self {
            Self::Memory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    /// 设置普通键的值
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        match self {
            Self::Memory(cache) => cache.set(key, value).await,
            Self::Redis(cache) => cache.set(key, value).await,
        }
    }

    /// 删除键
    pub async fn delete(&self, key: &str) -> Result<bool> {
        match self {
            Self::Memory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    /// 读取哈希字段
    pub async fn hget<T>(&self, key: &str, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self {
            Self::Memory(cache) => cache.hget(key, field).await,
            Self::Redis(cache) => cache.hget(key, field).await,
        }
    }

    /// 写入哈希字段
    pub async fn hset<T>(&self, key: &str, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        match self {
            Self::Memory(cache) => cache.hset(key, field, value).await,
            Self::Redis(cache) => cache.hset(key, field, value).await,
        }
    }

    /// 读取整个哈希
    pub async fn hgetall<T>(&self, key: &str) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        match self {
            Self::Memory(cache) => cache.hgetall(key).await,
            Self::Redis(cache) => cache.hgetall(key).await,
        }
    }

    /// 连通性检查
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Memory(cache) => cache.ping().await,
            Self::Redis(cache) => cache.ping().await,
        }
    }
}

/// 统一缓存管理器
///
/// 在提供者之上叠加命名空间，所有录制器键都经由 [`CacheKey`] 生成。
pub struct UnifiedCacheManager {
    provider: CacheProviderType,
    namespace: String,
}

impl UnifiedCacheManager {
    /// 根据配置创建缓存管理器
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let provider = match config.cache_type {
            CacheType::Memory => {
                linfo!("system", LogStage::Startup, LogComponent::Cache, "memory_cache", "使用内存缓存");
                CacheProviderType::Memory(MemoryCache::new())
            }
            CacheType::Redis => {
                let redis = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| RecorderError::config("cache_type = redis 但缺少 cache.redis 配置"))?;
                CacheProviderType::Redis(RedisCache::connect(redis).await?)
            }
        };

        Ok(Self::new(provider, config.namespace.clone()))
    }

    /// 使用已有的提供者创建
    #[must_use]
    pub fn new(provider: CacheProviderType, namespace: impl Into<String>) -> Self {
        Self {
            provider,
            namespace: namespace.into(),
        }
    }

    /// 创建进程内的内存缓存管理器
    #[must_use]
    pub fn memory() -> Self {
        Self::new(CacheProviderType::Memory(MemoryCache::new()), String::new())
    }

    /// 获取缓存提供者的引用
    #[must_use]
    pub const fn provider(&self) -> &CacheProviderType {
        &self.provider
    }

    /// 命名空间
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Redis 连接（仅 Redis 提供者）
    #[must_use]
    pub fn redis_connection(&self) -> Option<ConnectionManager> {
        match &self.provider {
            CacheProviderType::Redis(cache) => Some(cache.connection()),
            CacheProviderType::Memory(_) => None,
        }
    }

    /// 生成带命名空间的完整键
    #[must_use]
    pub fn key(&self, key: CacheKey) -> String {
        key.build(&self.namespace)
    }

    /// 获取普通键的值
    pub async fn get<T>(&self, key: CacheKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let full_key = self.key(key);
        ldebug!("system", LogStage::Cache, LogComponent::Cache, "get_cache", &format!("获取缓存: key={full_key}"));
        self.provider.get(&full_key).await
    }

    /// 设置普通键的值
    pub async fn set<T>(&self, key: CacheKey, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let full_key = self.key(key);
        ldebug!("system", LogStage::Cache, LogComponent::Cache, "set_cache", &format!("设置缓存: key={full_key}"));
        self.provider.set(&full_key, value).await
    }

    /// 删除键
    pub async fn delete(&self, key: CacheKey) -> Result<bool> {
        let full_key = self.key(key);
        ldebug!("system", LogStage::Cache, LogComponent::Cache, "delete_cache", &format!("删除缓存: key={full_key}"));
        self.provider.delete(&full_key).await
    }

    /// 读取哈希字段
    pub async fn hget<T>(&self, key: CacheKey, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.provider.hget(&self.key(key), field).await
    }

    /// 写入哈希字段
    pub async fn hset<T>(&self, key: CacheKey, field: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.provider.hset(&self.key(key), field, value).await
    }

    /// 读取整个哈希
    pub async fn hgetall<T>(&self, key: CacheKey) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        self.provider.hgetall(&self.key(key)).await
    }

    /// 连通性检查
    pub async fn ping(&self) -> Result<()> {
        self.provider.ping().await
    }
}
