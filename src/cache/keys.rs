//! # 缓存键命名规范
//!
//! 录制器在共享存储中使用的全部键集中定义在这里

use std::fmt;

/// 缓存键类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    /// 录制开关 - `recorder-intercept`
    InterceptFlag,
    /// 追踪摘要哈希（列表用）- `recorder-requests-sparse`
    SparseTraces,
    /// 追踪完整记录哈希（详情用）- `recorder-requests`
    FullTraces,
}

impl CacheKey {
    /// 生成不带命名空间的键字符串
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InterceptFlag => "recorder-intercept",
            Self::SparseTraces => "recorder-requests-sparse",
            Self::FullTraces => "recorder-requests",
        }
    }

    /// 生成带命名空间前缀的键字符串
    #[must_use]
    pub fn build(self, namespace: &str) -> String {
        namespaced(namespace, self.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 拼接命名空间前缀，空命名空间保持原样
#[must_use]
pub fn namespaced(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{namespace}:{key}")
    }
}
