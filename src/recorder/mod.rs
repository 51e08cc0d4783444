//! # SQL 调用录制
//!
//! 开关打开时，为每个请求挂载一个录制器，透明拦截该请求内的全部数据库调用，
//! 请求结束时生成摘要与完整记录，写入两级存储并发布完成通知。
//!
//! 生命周期：`record()` 挂载录制器 → 处理器经由 [`RequestScope::executor`] 访问数据库
//! → `dump()` 卸下录制器、持久化（摘要 → 通知 → 完整记录）。

pub mod control;
pub mod formatter;
pub mod interceptor;
pub mod models;
pub mod notifier;
pub mod scope;
pub mod session;
pub mod store;
pub mod switch;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::cache::UnifiedCacheManager;
use crate::config::{CacheConfig, RecorderConfig};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo};

pub use control::{TraceLookup, bypass_recording};
pub use formatter::QueryFormatter;
pub use interceptor::{CallPath, CaptureOptions, InterceptedExecutor, QueryExecutor};
pub use models::{Call, RequestMeta, TraceRecord, TraceSummary};
pub use notifier::{BroadcastPublisher, Notifier, Publisher, RedisPublisher, TRACE_COMPLETED_EVENT, TraceEvent};
pub use scope::RequestScope;
pub use session::{Recorder, generate_trace_id};
pub use store::TraceStore;
pub use switch::ArmSwitch;

/// 录制服务：开关、存储与通知的组合
pub struct RecorderService {
    cache: Arc<UnifiedCacheManager>,
    switch: ArmSwitch,
    store: TraceStore,
    notifier: Arc<Notifier>,
    config: RecorderConfig,
}

impl RecorderService {
    /// 按配置连接共享存储并创建服务
    pub async fn from_config(cache: &CacheConfig, config: RecorderConfig) -> Result<Self> {
        let cache = Arc::new(UnifiedCacheManager::from_config(cache).await?);
        Ok(Self::new(cache, config))
    }

    #[must_use]
    pub fn new(cache: Arc<UnifiedCacheManager>, config: RecorderConfig) -> Self {
        let notifier = Arc::new(Notifier::from_cache(&cache, &config));
        Self::with_notifier(cache, config, notifier)
    }

    /// 使用自定义通知器创建
    #[must_use]
    pub fn with_notifier(cache: Arc<UnifiedCacheManager>, config: RecorderConfig, notifier: Arc<Notifier>) -> Self {
        Self {
            switch: ArmSwitch::new(Arc::clone(&cache)),
            store: TraceStore::new(Arc::clone(&cache)),
            cache,
            notifier,
            config,
        }
    }

    /// 进程内存储的服务，开发与测试用
    #[must_use]
    pub fn in_memory(config: RecorderConfig) -> Self {
        Self::new(Arc::new(UnifiedCacheManager::memory()), config)
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<UnifiedCacheManager> {
        &self.cache
    }

    #[must_use]
    pub const fn switch(&self) -> &ArmSwitch {
        &self.switch
    }

    #[must_use]
    pub const fn store(&self) -> &TraceStore {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// 订阅追踪完成事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.notifier.subscribe()
    }

    /// 读取开关；共享存储不可用时按未开启处理
    pub async fn is_armed(&self) -> bool {
        match self.switch.is_armed().await {
            Ok(armed) => armed,
            Err(e) => {
                lerror!(
                    "system",
                    LogStage::Recording,
                    LogComponent::ArmSwitch,
                    "read_switch_failed",
                    &format!("读取录制开关失败，本次请求不录制: {e}")
                );
                false
            }
        }
    }

    /// 该作用域是否应当开始录制：开关已打开且尚无录制器
    pub async fn should_record(&self, scope: &RequestScope) -> bool {
        !scope.is_recording() && self.is_armed().await
    }

    /// 为作用域挂载新的录制器并安装拦截器
    pub fn begin(&self, scope: &RequestScope, meta: RequestMeta) -> Option<Arc<Recorder>> {
        let recorder = Arc::new(Recorder::new(meta));
        if !scope.attach(Arc::clone(&recorder), CaptureOptions::from(&self.config)) {
            return None;
        }

        ldebug!(
            recorder.id(),
            LogStage::Recording,
            LogComponent::Recorder,
            "record_start",
            "开始录制请求",
            path = recorder.meta().path,
            method = recorder.meta().method
        );
        Some(recorder)
    }

    /// 请求开始钩子：开关打开且作用域空闲时挂载录制器
    pub async fn record(&self, scope: &RequestScope, meta: RequestMeta) -> Option<Arc<Recorder>> {
        if self.should_record(scope).await {
            self.begin(scope, meta)
        } else {
            None
        }
    }

    /// 请求结束钩子：卸下录制器并持久化；没有录制器时什么也不做
    ///
    /// 返回本次追踪的摘要。启用 `async_dump` 时持久化在后台任务中完成，
    /// 单条追踪内部仍保持"摘要 → 通知 → 完整记录"的顺序。
    pub async fn dump(&self, scope: &RequestScope) -> Option<TraceSummary> {
        let recorder = scope.detach()?;
        let record = recorder.finish();
        let summary = record.summary.clone();

        if self.config.async_dump {
            let store = self.store.clone();
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                persist(&store, &notifier, &record).await;
            });
        } else {
            persist(&self.store, &self.notifier, &record).await;
        }

        Some(summary)
    }
}

/// 写摘要 → 发布通知 → 写完整记录；任何一步失败都只记日志
async fn persist(store: &TraceStore, notifier: &Notifier, record: &TraceRecord) {
    let id = record.id();

    if let Err(e) = store.put_sparse(id, &record.summary).await {
        lerror!(
            id,
            LogStage::Persistence,
            LogComponent::Store,
            "put_sparse_failed",
            &format!("写入追踪摘要失败，本次追踪丢弃: {e}")
        );
        return;
    }

    notifier.publish(&record.summary).await;

    if let Err(e) = store.put_full(id, record).await {
        lerror!(
            id,
            LogStage::Persistence,
            LogComponent::Store,
            "put_full_failed",
            &format!("写入完整追踪记录失败: {e}")
        );
        return;
    }

    linfo!(
        id,
        LogStage::Persistence,
        LogComponent::Recorder,
        "trace_saved",
        "追踪已保存",
        path = record.summary.path,
        query_count = record.summary.query_count,
        total_query_time_ms = record.summary.total_query_time_ms
    );
}
