//! # 录制控制 API 流程测试
//!
//! 通过管理服务器路由走完整的请求生命周期：
//! 1. 开关控制
//! 2. 宿主请求被录制
//! 3. 查询、清空
//! 4. 控制接口本身不被录制

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use sea_orm::Database;
use serde_json::Value;
use tower::ServiceExt;

use sql_recorder::{
    AppConfig, RecorderService,
    management::{AppState, ManagementServer},
    recorder::TRACE_COMPLETED_EVENT,
};

async fn test_app() -> (Router, Arc<RecorderService>) {
    let config = Arc::new(AppConfig::default());
    let recorder = Arc::new(RecorderService::in_memory(config.recorder.clone()));
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let state = AppState::new(config, Arc::clone(&recorder), Arc::new(db));
    (ManagementServer::create_router(&state), recorder)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn listing(app: &Router) -> Vec<Value> {
    let (status, body) = send(app, Method::GET, "/api/recorder/traces").await;
    assert_eq!(status, StatusCode::OK);
    body["data"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_full_recording_flow() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/recorder/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], false);

    let (status, body) = send(&app, Method::POST, "/api/recorder/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(&app, Method::GET, "/api/recorder/status").await;
    assert_eq!(body["data"], true);

    let (status, info) = send(&app, Method::GET, "/api/system/info?cmd=system.info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["data"]["recording"], true);

    // 只有宿主请求留下追踪，控制接口被绕过
    let traces = listing(&app).await;
    assert_eq!(traces.len(), 1);
    let summary = &traces[0];
    assert_eq!(summary["path"], "/api/system/info");
    assert_eq!(summary["command"], "system.info");
    assert_eq!(summary["method"], "GET");
    assert_eq!(summary["query_count"], 1);
    assert!(summary.get("calls").is_none());

    let id = summary["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 10);

    let (status, detail) = send(&app, Method::GET, &format!("/api/recorder/traces/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    let record = &detail["data"];
    assert_eq!(record["id"], id.as_str());
    assert_eq!(record["query_count"], 1);
    let query = record["calls"][0]["query"].as_str().unwrap();
    assert!(query.starts_with("SELECT"));
    assert!(query.contains("sqlite_version()"));
    assert_eq!(record["total_query_time_ms"], record["calls"][0]["duration_ms"]);
    assert_eq!(record["form_fields"]["cmd"], "system.info");

    let (_, by_query) = send(&app, Method::GET, &format!("/api/recorder/traces?id={id}")).await;
    assert_eq!(by_query["data"], detail["data"]);

    let (status, missing) = send(&app, Method::GET, "/api/recorder/traces?id=ffffffffff").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(missing["data"], Value::Null);

    let (status, _) = send(&app, Method::DELETE, "/api/recorder/traces").await;
    assert_eq!(status, StatusCode::OK);
    assert!(listing(&app).await.is_empty());
    let (_, gone) = send(&app, Method::GET, &format!("/api/recorder/traces/{id}")).await;
    assert_eq!(gone["data"], Value::Null);

    send(&app, Method::POST, "/api/recorder/stop").await;
    let (status, _) = send(&app, Method::GET, "/api/system/info").await;
    assert_eq!(status, StatusCode::OK);
    assert!(listing(&app).await.is_empty());
}

#[tokio::test]
async fn test_results_are_identical_with_and_without_recording() {
    let (app, _) = test_app().await;

    let (_, plain) = send(&app, Method::GET, "/api/system/info").await;
    send(&app, Method::POST, "/api/recorder/start").await;
    let (_, traced) = send(&app, Method::GET, "/api/system/info").await;

    assert_eq!(plain["data"]["database"], traced["data"]["database"]);
    assert!(!plain["data"]["database"]["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_without_queries_is_still_traced() {
    let (app, _) = test_app().await;
    send(&app, Method::POST, "/api/recorder/start").await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let traces = listing(&app).await;
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["query_count"], 0);
    assert_eq!(traces[0]["total_query_time_ms"], 0.0);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let (app, _) = test_app().await;

    send(&app, Method::POST, "/api/recorder/stop").await;
    let (_, body) = send(&app, Method::GET, "/api/recorder/status").await;
    assert_eq!(body["data"], false);

    send(&app, Method::POST, "/api/recorder/start").await;
    send(&app, Method::POST, "/api/recorder/start").await;
    let (_, body) = send(&app, Method::GET, "/api/recorder/status").await;
    assert_eq!(body["data"], true);
}

#[tokio::test]
async fn test_delete_on_empty_store() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::DELETE, "/api/recorder/traces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(listing(&app).await.is_empty());
}

#[tokio::test]
async fn test_completion_event_is_published() {
    let (app, recorder) = test_app().await;
    let mut events = recorder.subscribe();
    send(&app, Method::POST, "/api/recorder/start").await;

    send(&app, Method::GET, "/api/system/info").await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.event, TRACE_COMPLETED_EVENT);
    let payload: Value = serde_json::from_str(&event.payload).unwrap();
    assert_eq!(payload["path"], "/api/system/info");
    assert_eq!(payload["query_count"], 1);
}

#[tokio::test]
async fn test_event_stream_endpoint() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/recorder/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_concurrent_requests_get_separate_traces() {
    let (app, _) = test_app().await;
    send(&app, Method::POST, "/api/recorder/start").await;

    let (a, b) = tokio::join!(
        send(&app, Method::GET, "/api/system/info?cmd=first"),
        send(&app, Method::GET, "/api/system/info?cmd=second"),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);

    let traces = listing(&app).await;
    assert_eq!(traces.len(), 2);
    assert!(traces.iter().all(|trace| trace["query_count"] == 1));

    let mut commands: Vec<&str> = traces.iter().filter_map(|trace| trace["command"].as_str()).collect();
    commands.sort_unstable();
    assert_eq!(commands, vec!["first", "second"]);
}
