//! # 路由配置

use axum::Router;
use axum::routing::{get, post};

use crate::management::handlers::{recorder, system};
use crate::management::server::AppState;

/// 创建所有 API 路由（挂在 `api_prefix` 之下）
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // SQL 录制控制
        .nest("/recorder", recorder_routes())
        // 系统信息
        .nest("/system", system_routes())
        .with_state(state)
}

fn recorder_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(recorder::get_status))
        .route("/start", post(recorder::start_recording))
        .route("/stop", post(recorder::stop_recording))
        .route("/traces", get(recorder::get_traces).delete(recorder::delete_traces))
        .route("/traces/{id}", get(recorder::get_trace))
        .route("/events", get(recorder::stream_events))
}

fn system_routes() -> Router<AppState> {
    Router::new().route("/info", get(system::get_system_info))
}
