//! # 追踪数据模型
//!
//! 单次调用、请求元数据，以及 dump 时派生出的摘要与完整记录

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次被拦截的数据库调用，追加后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// 格式化后的查询文本
    pub query: String,
    /// 调用发生时的调用栈快照
    pub stack: String,
    /// 调用开始时间
    pub started_at: DateTime<Utc>,
    /// 耗时（毫秒，保留三位小数）
    pub duration_ms: f64,
}

/// 发起请求的标识信息，在 `record()` 时一次性采集
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub path: String,
    /// 请求参数中的 `cmd`，缺省为空串
    pub command: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub form_fields: BTreeMap<String, String>,
}

/// 追踪摘要：可批量列出的廉价字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub id: String,
    pub path: String,
    pub command: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub query_count: usize,
    pub total_query_time_ms: f64,
    pub total_duration_ms: f64,
}

/// 完整追踪记录：摘要字段 + 全部调用与请求元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    #[serde(flatten)]
    pub summary: TraceSummary,
    pub calls: Vec<Call>,
    pub headers: BTreeMap<String, String>,
    pub form_fields: BTreeMap<String, String>,
}

impl TraceRecord {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.summary.id
    }
}

/// 保留三位小数
#[must_use]
pub fn round_ms(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// 把时长换算为毫秒并保留三位小数
#[must_use]
pub fn duration_to_ms(duration: Duration) -> f64 {
    round_ms(duration.as_secs_f64() * 1000.0)
}

/// 调用耗时求和，结果保留三位小数
#[must_use]
pub fn total_query_time_ms(calls: &[Call]) -> f64 {
    round_ms(calls.iter().map(|call| call.duration_ms).sum())
}
