//! # 日志配置模块
//!
//! 提供日志初始化以及带阶段/组件标签的结构化日志宏

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Configuration,
    Cache,
    Db,
    RequestStart,
    Recording,
    Persistence,
    Notification,
    Control,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Cache => "cache",
            Self::Db => "db",
            Self::RequestStart => "request_start",
            Self::Recording => "recording",
            Self::Persistence => "persistence",
            Self::Notification => "notification",
            Self::Control => "control",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    ServerSetup,
    Config,
    Cache,
    Database,
    ArmSwitch,
    Recorder,
    Interceptor,
    Store,
    Notifier,
    Admin,
    Middleware,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::ServerSetup => "server_setup",
            Self::Config => "config",
            Self::Cache => "cache",
            Self::Database => "database",
            Self::ArmSwitch => "arm_switch",
            Self::Recorder => "recorder",
            Self::Interceptor => "interceptor",
            Self::Store => "store",
            Self::Notifier => "notifier",
            Self::Admin => "admin",
            Self::Middleware => "middleware",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化日志宏的公共实现
#[doc(hidden)]
#[macro_export]
macro_rules! __log_event {
    ($level:ident, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::tracing::$level!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($key = ?$value,)*
            "{}",
            $message
        )
    };
}

/// INFO 级结构化日志
#[macro_export]
macro_rules! linfo {
    ($($arg:tt)*) => { $crate::__log_event!(info, $($arg)*) };
}

/// DEBUG 级结构化日志
#[macro_export]
macro_rules! ldebug {
    ($($arg:tt)*) => { $crate::__log_event!(debug, $($arg)*) };
}

/// WARN 级结构化日志
#[macro_export]
macro_rules! lwarn {
    ($($arg:tt)*) => { $crate::__log_event!(warn, $($arg)*) };
}

/// ERROR 级结构化日志
#[macro_export]
macro_rules! lerror {
    ($($arg:tt)*) => { $crate::__log_event!(error, $($arg)*) };
}

/// 初始化优化的日志系统
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);

    // 默认配置：宿主数据库驱动的查询日志保持安静，录制器本身输出 debug
    let default_filter = format!("{level},sql_recorder=debug,sqlx::query=off,sea_orm=warn,sqlx=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
