//! # 录制控制处理器

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::{
        Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::management::middleware::ActiveScope;
use crate::management::response;
use crate::management::server::AppState;
use crate::recorder::bypass_recording;

/// `GET /traces` 的查询参数
#[derive(Debug, Default, Deserialize)]
pub struct TraceQuery {
    pub id: Option<String>,
}

/// 当前录制开关状态
pub async fn get_status(State(state): State<AppState>, scope: ActiveScope) -> Response {
    match state.recorder.status(scope.scope()).await {
        Ok(armed) => response::success_with_message(armed, if armed { "录制中" } else { "未录制" }),
        Err(e) => response::app_error(e),
    }
}

/// 开启录制
pub async fn start_recording(State(state): State<AppState>, scope: ActiveScope) -> Response {
    match state.recorder.start(scope.scope()).await {
        Ok(()) => response::success_without_data("SQL 录制已开启"),
        Err(e) => response::app_error(e),
    }
}

/// 关闭录制
pub async fn stop_recording(State(state): State<AppState>, scope: ActiveScope) -> Response {
    match state.recorder.stop(scope.scope()).await {
        Ok(()) => response::success_without_data("SQL 录制已关闭"),
        Err(e) => response::app_error(e),
    }
}

/// 带 `id` 时返回完整记录（未知 ID 为 `null`），否则列出全部摘要
pub async fn get_traces(
    State(state): State<AppState>,
    scope: ActiveScope,
    Query(query): Query<TraceQuery>,
) -> Response {
    match state.recorder.get(scope.scope(), query.id.as_deref()).await {
        Ok(lookup) => response::success(lookup),
        Err(e) => response::app_error(e),
    }
}

/// `GET /traces/{id}`
pub async fn get_trace(State(state): State<AppState>, scope: ActiveScope, Path(id): Path<String>) -> Response {
    match state.recorder.get(scope.scope(), Some(&id)).await {
        Ok(lookup) => response::success(lookup),
        Err(e) => response::app_error(e),
    }
}

/// 清空全部追踪
pub async fn delete_traces(State(state): State<AppState>, scope: ActiveScope) -> Response {
    match state.recorder.delete(scope.scope()).await {
        Ok(()) => response::success_without_data("已清空全部追踪记录"),
        Err(e) => response::app_error(e),
    }
}

/// 追踪完成事件流（SSE）
pub async fn stream_events(
    State(state): State<AppState>,
    scope: ActiveScope,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    bypass_recording(scope.scope());

    // 落后太多的订阅者会丢失部分事件，直接跳过
    let events = BroadcastStream::new(state.recorder.subscribe())
        .filter_map(Result::ok)
        .map(|event| Ok(Event::default().event(event.event).data(event.payload)));

    Sse::new(events).keep_alive(KeepAlive::default())
}
