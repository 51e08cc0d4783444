//! # 错误处理宏

/// 按变体名快速构造 `RecorderError`
///
/// ```ignore
/// let err = error!(Config, "端口不能为0");
/// ```
#[macro_export]
macro_rules! error {
    ($variant:ident, $msg:expr) => {
        $crate::error::RecorderError::$variant {
            message: ::std::string::String::from($msg),
            source: None,
        }
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        $crate::error::RecorderError::$variant {
            message: format!($fmt, $($arg)*),
            source: None,
        }
    };
}

/// 确保条件成立，否则返回指定变体的错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $variant:ident, $msg:expr) => {
        if !($cond) {
            return Err($crate::error!($variant, $msg));
        }
    };
    ($cond:expr, $variant:ident, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::error!($variant, $fmt, $($arg)*));
        }
    };
}
