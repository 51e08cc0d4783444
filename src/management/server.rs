//! # 管理服务器
//!
//! Axum HTTP服务器：录制控制 API、事件流，以及挂在录制中间件之后的宿主接口

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::get;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::system::ping_handler;
use super::middleware::recording_middleware;
use super::routes::create_routes;
use crate::config::AppConfig;
use crate::error::{RecorderError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::recorder::{QueryExecutor, RecorderService};

/// 管理服务器应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub recorder: Arc<RecorderService>,
    /// 宿主的原始数据库执行器，每个请求作用域都从它开始
    pub database: Arc<dyn QueryExecutor>,
    pub started: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, recorder: Arc<RecorderService>, database: Arc<dyn QueryExecutor>) -> Self {
        Self {
            config,
            recorder,
            database,
            started: Instant::now(),
        }
    }
}

/// 管理服务器
pub struct ManagementServer {
    state: AppState,
    router: Router,
}

impl ManagementServer {
    /// 创建新的管理服务器
    #[must_use]
    pub fn new(state: AppState) -> Self {
        let router = Self::create_router(&state);
        Self { state, router }
    }

    /// 创建路由器
    ///
    /// 录制中间件包在所有路由外层；控制接口自行绕过录制。
    #[must_use]
    pub fn create_router(state: &AppState) -> Router {
        let server = &state.config.server;

        let mut app = Router::new()
            .nest(&server.api_prefix, create_routes(state.clone()))
            .route("/ping", get(ping_handler))
            .layer(axum::middleware::from_fn_with_state(state.clone(), recording_middleware));

        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        if server.enable_cors {
            let cors_layer = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT, header::ORIGIN])
                .allow_origin(Any);
            app = app.layer(service_builder.layer(cors_layer));
        } else {
            app = app.layer(service_builder);
        }

        app
    }

    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// 启动服务器
    pub async fn serve(self) -> Result<()> {
        let server = &self.state.config.server;
        let ip = server.bind_address.parse::<std::net::IpAddr>().map_err(|e| {
            crate::error!(Config, format!("无效的监听地址 '{}': {e}", server.bind_address))
        })?;
        let addr = SocketAddr::new(ip, server.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RecorderError::server_start_with_source(format!("无法绑定 {addr}"), e))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("管理服务器已启动: http://{addr}")
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RecorderError::server_start_with_source("管理服务器异常退出", e))?;

        linfo!("system", LogStage::Shutdown, LogComponent::ServerSetup, "server_stop", "管理服务器已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
