//! # 缓存模块
//!
//! 跨进程共享的键值存储：内存实现与 Redis 实现

pub mod abstract_cache;
pub mod keys;

pub use abstract_cache::{CacheProvider, CacheProviderType, MemoryCache, RedisCache, UnifiedCacheManager};
pub use keys::{CacheKey, namespaced};
