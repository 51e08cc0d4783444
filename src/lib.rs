//! # SQL Recorder
//!
//! 请求级 SQL 调用录制库：开关打开时透明拦截单个请求内的全部数据库调用，
//! 请求结束后把摘要与完整记录写入共享存储，并向实时订阅者发布完成事件。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod management;
pub mod recorder;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{RecorderError, Result};
pub use recorder::{RecorderService, RequestScope};
