//! # 管理API模块
//!
//! 录制控制接口、实时事件流，以及请求生命周期中间件

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, ManagementServer};
