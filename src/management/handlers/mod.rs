//! # 请求处理器

pub mod recorder;
pub mod system;
