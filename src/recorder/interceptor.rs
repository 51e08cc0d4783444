//! # 数据库调用拦截
//!
//! [`QueryExecutor`] 是宿主执行 SQL 的唯一入口。录制期间，请求作用域内的
//! [`CallPath`] 被切换到 [`InterceptedExecutor`]：它计时、抓取调用栈、格式化查询文本，
//! 然后把底层结果原样返回。其他请求看到的仍是原始执行器。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement};

use super::formatter::{QueryFormatter, capture_stack};
use super::models::{Call, duration_to_ms};
use super::session::Recorder;
use crate::config::RecorderConfig;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;

/// 数据库执行入口
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// 连接所用的 SQL 方言
    fn backend(&self) -> DbBackend;

    /// 执行不返回行的语句
    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr>;

    /// 执行查询并返回全部行
    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr>;
}

#[async_trait]
impl QueryExecutor for DatabaseConnection {
    fn backend(&self) -> DbBackend {
        ConnectionTrait::get_database_backend(self)
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        ConnectionTrait::execute(self, stmt).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        ConnectionTrait::query_all(self, stmt).await
    }
}

/// 每次调用的采集选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub capture_stack: bool,
    pub max_stack_lines: usize,
    pub format_queries: bool,
}

impl From<&RecorderConfig> for CaptureOptions {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            capture_stack: config.capture_stack,
            max_stack_lines: config.max_stack_lines,
            format_queries: config.format_queries,
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

/// 带计时与记录的执行器装饰
pub struct InterceptedExecutor {
    inner: Arc<dyn QueryExecutor>,
    recorder: Arc<Recorder>,
    options: CaptureOptions,
}

impl InterceptedExecutor {
    #[must_use]
    pub fn new(inner: Arc<dyn QueryExecutor>, recorder: Arc<Recorder>, options: CaptureOptions) -> Self {
        Self {
            inner,
            recorder,
            options,
        }
    }

    #[must_use]
    pub const fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// 构造并追加一条调用记录。这里的任何 panic 都被吞掉，不影响数据库调用本身
    fn capture(&self, sql: &str, started_at: DateTime<Utc>, elapsed: Duration) {
        let options = self.options;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| Call {
            query: if options.format_queries {
                QueryFormatter::format(sql)
            } else {
                sql.to_string()
            },
            stack: if options.capture_stack {
                capture_stack(options.max_stack_lines)
            } else {
                String::new()
            },
            started_at,
            duration_ms: duration_to_ms(elapsed),
        }));

        match outcome {
            Ok(call) => self.recorder.register(call),
            Err(_) => lwarn!(
                self.recorder.id(),
                LogStage::Recording,
                LogComponent::Interceptor,
                "capture_call",
                "采集调用信息失败，已跳过本次记录"
            ),
        }
    }
}

#[async_trait]
impl QueryExecutor for InterceptedExecutor {
    fn backend(&self) -> DbBackend {
        self.inner.backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let sql = stmt.sql.clone();
        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.inner.execute(stmt).await;
        self.capture(&sql, started_at, started.elapsed());
        result
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let sql = stmt.sql.clone();
        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.inner.query_all(stmt).await;
        self.capture(&sql, started_at, started.elapsed());
        result
    }
}

/// 请求作用域内"当前使用哪条调用路径"的引用
///
/// 默认指向原始执行器；安装拦截器后指向装饰器，恢复后回到原始执行器。
pub struct CallPath {
    original: Arc<dyn QueryExecutor>,
    intercepted: RwLock<Option<Arc<InterceptedExecutor>>>,
}

impl CallPath {
    #[must_use]
    pub fn new(original: Arc<dyn QueryExecutor>) -> Self {
        Self {
            original,
            intercepted: RwLock::new(None),
        }
    }

    /// 当前生效的执行器
    #[must_use]
    pub fn get(&self) -> Arc<dyn QueryExecutor> {
        let guard = self.intercepted.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.as_ref().map_or_else(
            || Arc::clone(&self.original),
            |interceptor| Arc::clone(interceptor) as Arc<dyn QueryExecutor>,
        )
    }

    /// 原始执行器
    #[must_use]
    pub fn original(&self) -> Arc<dyn QueryExecutor> {
        Arc::clone(&self.original)
    }

    /// 为给定录制器安装拦截器，替换已有的
    pub fn install(&self, recorder: Arc<Recorder>, options: CaptureOptions) {
        let interceptor = InterceptedExecutor::new(Arc::clone(&self.original), recorder, options);
        *self.intercepted.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::new(interceptor));
    }

    /// 恢复原始执行器，返回之前是否处于拦截状态
    pub fn restore(&self) -> bool {
        self.intercepted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .is_some()
    }

    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        self.intercepted
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }
}
