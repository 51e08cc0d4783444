//! # 两级追踪存储
//!
//! 摘要哈希用于批量列出，完整记录哈希按 ID 单条读取。两者共用同一个追踪 ID。

use std::sync::Arc;

use super::models::{TraceRecord, TraceSummary};
use crate::cache::{CacheKey, UnifiedCacheManager};
use crate::error::Result;

/// 追踪存储
#[derive(Clone)]
pub struct TraceStore {
    cache: Arc<UnifiedCacheManager>,
}

impl TraceStore {
    #[must_use]
    pub const fn new(cache: Arc<UnifiedCacheManager>) -> Self {
        Self { cache }
    }

    pub async fn put_sparse(&self, id: &str, summary: &TraceSummary) -> Result<()> {
        self.cache.hset(CacheKey::SparseTraces, id, summary).await
    }

    pub async fn put_full(&self, id: &str, record: &TraceRecord) -> Result<()> {
        self.cache.hset(CacheKey::FullTraces, id, record).await
    }

    pub async fn get_sparse(&self, id: &str) -> Result<Option<TraceSummary>> {
        self.cache.hget(CacheKey::SparseTraces, id).await
    }

    pub async fn get_full(&self, id: &str) -> Result<Option<TraceRecord>> {
        self.cache.hget(CacheKey::FullTraces, id).await
    }

    /// 全部摘要，顺序不定
    pub async fn list_sparse(&self) -> Result<Vec<TraceSummary>> {
        let all = self.cache.hgetall::<TraceSummary>(CacheKey::SparseTraces).await?;
        Ok(all.into_values().collect())
    }

    /// 清空两级存储
    pub async fn clear_all(&self) -> Result<()> {
        self.cache.delete(CacheKey::SparseTraces).await?;
        self.cache.delete(CacheKey::FullTraces).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::models::RequestMeta;
    use crate::recorder::session::Recorder;
    use pretty_assertions::assert_eq;

    fn finished_trace(path: &str) -> TraceRecord {
        Recorder::new(RequestMeta {
            path: path.to_string(),
            method: "GET".to_string(),
            ..RequestMeta::default()
        })
        .finish()
    }

    #[tokio::test]
    async fn test_two_tiers_share_id() {
        let store = TraceStore::new(Arc::new(UnifiedCacheManager::memory()));
        let record = finished_trace("/api/system/info");

        store.put_sparse(record.id(), &record.summary).await.unwrap();
        store.put_full(record.id(), &record).await.unwrap();

        let sparse = store.get_sparse(record.id()).await.unwrap().unwrap();
        let full = store.get_full(record.id()).await.unwrap().unwrap();
        assert_eq!(sparse, full.summary);
        assert_eq!(full, record);
        assert_eq!(store.list_sparse().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_entry() {
        let store = TraceStore::new(Arc::new(UnifiedCacheManager::memory()));
        let record = finished_trace("/a");
        let mut changed = record.summary.clone();
        changed.path = "/b".to_string();

        store.put_sparse(record.id(), &record.summary).await.unwrap();
        store.put_sparse(record.id(), &changed).await.unwrap();

        let listing = store.list_sparse().await.unwrap();
        assert_eq!(listing, vec![changed]);
    }

    #[tokio::test]
    async fn test_clear_all_empties_both_tiers() {
        let store = TraceStore::new(Arc::new(UnifiedCacheManager::memory()));
        store.clear_all().await.unwrap();

        let record = finished_trace("/a");
        store.put_sparse(record.id(), &record.summary).await.unwrap();
        store.put_full(record.id(), &record).await.unwrap();
        store.clear_all().await.unwrap();

        assert!(store.get_sparse(record.id()).await.unwrap().is_none());
        assert!(store.get_full(record.id()).await.unwrap().is_none());
        assert!(store.list_sparse().await.unwrap().is_empty());
    }
}
