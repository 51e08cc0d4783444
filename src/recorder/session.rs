//! # 单请求录制会话
//!
//! 一个 [`Recorder`] 只属于一个请求作用域，调用序列只追加不修改。

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::models::{Call, RequestMeta, TraceRecord, TraceSummary, duration_to_ms, total_query_time_ms};

/// 追踪 ID 长度（十六进制字符）
pub const TRACE_ID_LENGTH: usize = 10;

/// 生成定长、抗碰撞的追踪 ID
#[must_use]
pub fn generate_trace_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(nanos.to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(TRACE_ID_LENGTH);
    id
}

/// 单个请求的录制器
#[derive(Debug)]
pub struct Recorder {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    meta: RequestMeta,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    /// 创建录制器，请求元数据在此刻固定
    #[must_use]
    pub fn new(meta: RequestMeta) -> Self {
        Self {
            id: generate_trace_id(),
            started_at: Utc::now(),
            started: Instant::now(),
            meta,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    // 中毒的锁仍可继续追加，录制不能因为别处 panic 而失败
    fn lock_calls(&self) -> MutexGuard<'_, Vec<Call>> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// 追加一次调用
    pub fn register(&self, call: Call) {
        self.lock_calls().push(call);
    }

    /// 已记录调用的快照，按调用顺序
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock_calls().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// 结束录制，生成完整记录（摘要即其 `summary` 字段）
    #[must_use]
    pub fn finish(&self) -> TraceRecord {
        let calls = self.calls();
        let summary = TraceSummary {
            id: self.id.clone(),
            path: self.meta.path.clone(),
            command: self.meta.command.clone(),
            method: self.meta.method.clone(),
            started_at: self.started_at,
            query_count: calls.len(),
            total_query_time_ms: total_query_time_ms(&calls),
            total_duration_ms: duration_to_ms(self.started.elapsed()),
        };

        TraceRecord {
            summary,
            calls,
            headers: self.meta.headers.clone(),
            form_fields: self.meta.form_fields.clone(),
        }
    }
}
