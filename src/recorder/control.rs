//! # 录制控制操作
//!
//! status / start / stop / get / delete。每个操作开头都先调用 [`bypass_recording`]，
//! 拆掉调用方自身作用域上的录制器，保证控制面调用不会被录制。

use serde::Serialize;

use super::RecorderService;
use super::models::{TraceRecord, TraceSummary};
use super::scope::RequestScope;
use crate::error::Result;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};

/// 强制拆除调用方作用域上的录制器并恢复原始调用路径
pub fn bypass_recording(scope: Option<&RequestScope>) {
    if let Some(discarded) = scope.and_then(RequestScope::teardown) {
        linfo!(
            &discarded,
            LogStage::Control,
            LogComponent::Admin,
            "bypass_recording",
            "控制操作前丢弃当前请求的录制器"
        );
    }
}

/// `get` 的结果：按 ID 取完整记录，或列出全部摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceLookup {
    /// 未知 ID 为 `None`
    Detail(Option<Box<TraceRecord>>),
    /// 按开始时间从新到旧
    Listing(Vec<TraceSummary>),
}

impl RecorderService {
    /// 当前开关状态
    pub async fn status(&self, scope: Option<&RequestScope>) -> Result<bool> {
        bypass_recording(scope);
        self.switch.is_armed().await
    }

    /// 打开开关
    pub async fn start(&self, scope: Option<&RequestScope>) -> Result<()> {
        bypass_recording(scope);
        self.switch.arm().await?;
        linfo!("system", LogStage::Control, LogComponent::Admin, "start", "SQL 录制已开启");
        Ok(())
    }

    /// 关闭开关
    pub async fn stop(&self, scope: Option<&RequestScope>) -> Result<()> {
        bypass_recording(scope);
        self.switch.disarm().await?;
        linfo!("system", LogStage::Control, LogComponent::Admin, "stop", "SQL 录制已关闭");
        Ok(())
    }

    /// 带 ID 时返回完整记录，否则返回摘要列表
    pub async fn get(&self, scope: Option<&RequestScope>, id: Option<&str>) -> Result<TraceLookup> {
        bypass_recording(scope);
        match id {
            Some(id) => {
                let record = self.store.get_full(id).await?;
                Ok(TraceLookup::Detail(record.map(Box::new)))
            }
            None => {
                let mut listing = self.store.list_sparse().await?;
                listing.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
                Ok(TraceLookup::Listing(listing))
            }
        }
    }

    /// 清空两级存储
    pub async fn delete(&self, scope: Option<&RequestScope>) -> Result<()> {
        bypass_recording(scope);
        self.store.clear_all().await?;
        linfo!("system", LogStage::Control, LogComponent::Admin, "delete", "已清空全部追踪记录");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::recorder::interceptor::tests::FailingExecutor;
    use crate::recorder::models::RequestMeta;
    use sea_orm::{DbBackend, Statement};
    use std::sync::Arc;

    fn service() -> RecorderService {
        RecorderService::in_memory(RecorderConfig::default())
    }

    async fn recorded_trace(service: &RecorderService, path: &str) -> TraceSummary {
        let scope = RequestScope::new(Arc::new(FailingExecutor));
        service
            .begin(
                &scope,
                RequestMeta {
                    path: path.to_string(),
                    ..RequestMeta::default()
                },
            )
            .unwrap();
        service.dump(&scope).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_stop_status_are_idempotent() {
        let service = service();
        assert!(!service.status(None).await.unwrap());

        service.start(None).await.unwrap();
        service.start(None).await.unwrap();
        assert!(service.status(None).await.unwrap());

        service.stop(None).await.unwrap();
        service.stop(None).await.unwrap();
        assert!(!service.status(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_call_tears_down_active_recorder() {
        let service = service();
        service.start(None).await.unwrap();

        let scope = RequestScope::new(Arc::new(FailingExecutor));
        let recorder = service.record(&scope, RequestMeta::default()).await.unwrap();
        assert!(scope.call_path().is_intercepted());

        assert!(service.status(Some(&scope)).await.unwrap());
        assert!(!scope.is_recording());
        assert!(!scope.call_path().is_intercepted());

        let _ = scope
            .executor()
            .query_all(Statement::from_string(DbBackend::Sqlite, "select 1"))
            .await;
        assert_eq!(recorder.call_count(), 0);
        assert!(service.dump(&scope).await.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_empty_detail() {
        let service = service();
        let lookup = service.get(None, Some("0000000000")).await.unwrap();
        assert_eq!(lookup, TraceLookup::Detail(None));
        assert_eq!(serde_json::to_value(&lookup).unwrap(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let service = service();
        let older = recorded_trace(&service, "/older").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = recorded_trace(&service, "/newer").await;

        let TraceLookup::Listing(listing) = service.get(None, None).await.unwrap() else {
            panic!("expected listing");
        };
        let paths: Vec<&str> = listing.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["/newer", "/older"]);

        let TraceLookup::Detail(Some(full)) = service.get(None, Some(&older.id)).await.unwrap() else {
            panic!("expected detail");
        };
        assert_eq!(full.summary, older);
        assert_ne!(newer.id, older.id);
    }

    #[tokio::test]
    async fn test_delete_clears_both_tiers_and_tolerates_empty_store() {
        let service = service();
        service.delete(None).await.unwrap();

        let summary = recorded_trace(&service, "/a").await;
        service.delete(None).await.unwrap();

        assert!(service.store().get_sparse(&summary.id).await.unwrap().is_none());
        assert_eq!(service.get(None, Some(&summary.id)).await.unwrap(), TraceLookup::Detail(None));
        assert_eq!(service.get(None, None).await.unwrap(), TraceLookup::Listing(Vec::new()));
    }
}
