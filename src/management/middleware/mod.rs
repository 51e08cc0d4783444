//! # 管理服务器中间件

pub mod recording;

pub use recording::{ActiveScope, capture_request_meta, recording_middleware};
