//! # 系统信息处理器

use axum::extract::State;
use axum::response::Response;
use sea_orm::{DbBackend, Statement};
use serde::Serialize;

use crate::config::CacheType;
use crate::error::RecorderError;
use crate::management::middleware::ActiveScope;
use crate::management::response;
use crate::management::server::AppState;

#[derive(Serialize)]
struct SystemInfo {
    service: ServiceInfo,
    runtime: RuntimeInfo,
    database: DatabaseInfo,
    cache: CacheInfo,
    recording: bool,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct RuntimeInfo {
    uptime_seconds: u64,
    uptime: String,
    target: &'static str,
}

#[derive(Serialize)]
struct DatabaseInfo {
    backend: &'static str,
    version: String,
}

#[derive(Serialize)]
struct CacheInfo {
    cache_type: CacheType,
    namespace: String,
    healthy: bool,
}

const fn version_query(backend: DbBackend) -> (&'static str, &'static str) {
    match backend {
        DbBackend::Sqlite => ("sqlite", "SELECT sqlite_version() AS version"),
        DbBackend::Postgres => ("postgres", "SELECT version() AS version"),
        _ => ("mysql", "SELECT VERSION() AS version"),
    }
}

/// 获取系统信息
///
/// 数据库版本经由本请求的执行器查询，录制开启时会出现在追踪里。
pub async fn get_system_info(State(state): State<AppState>, scope: ActiveScope) -> Response {
    let executor = scope.executor_or(&state.database);
    let (backend, sql) = version_query(executor.backend());

    let version = match executor.query_all(Statement::from_string(executor.backend(), sql)).await {
        Ok(rows) => rows
            .first()
            .and_then(|row| row.try_get::<String>("", "version").ok())
            .unwrap_or_default(),
        Err(e) => return response::app_error(RecorderError::database_with_source("查询数据库版本失败", e)),
    };

    let uptime_seconds = state.started.elapsed().as_secs();
    let system_info = SystemInfo {
        service: ServiceInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
        runtime: RuntimeInfo {
            uptime_seconds,
            uptime: format_uptime(uptime_seconds),
            target: std::env::consts::ARCH,
        },
        database: DatabaseInfo {
            backend,
            version,
        },
        cache: CacheInfo {
            cache_type: state.config.cache.cache_type,
            namespace: state.config.cache.namespace.clone(),
            healthy: state.recorder.cache().ping().await.is_ok(),
        },
        recording: state.recorder.is_armed().await,
    };

    response::success(system_info)
}

/// Ping 处理器
pub async fn ping_handler() -> &'static str {
    "pong"
}

/// 格式化运行时间为可读字符串
fn format_uptime(uptime_seconds: u64) -> String {
    let days = uptime_seconds / 86_400;
    let hours = (uptime_seconds % 86_400) / 3_600;
    let minutes = (uptime_seconds % 3_600) / 60;
    let seconds = uptime_seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
