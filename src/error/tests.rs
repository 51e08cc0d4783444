//! # 错误处理测试

use crate::error::{Context, RecorderError, Result};
use axum::http::StatusCode;
use std::error::Error;

#[test]
fn test_config_error_creation() {
    let err = RecorderError::config("测试配置错误");
    assert!(matches!(err, RecorderError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: 测试配置错误");
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err = RecorderError::config_with_source("配置文件加载失败", io_err);

    assert!(matches!(err, RecorderError::Config { .. }));
    assert!(err.to_string().contains("配置错误: 配置文件加载失败"));
    assert!(err.source().is_some());
}

#[test]
fn test_auto_conversion_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err: RecorderError = io_err.into();

    assert!(matches!(err, RecorderError::Io { .. }));
    assert!(err.to_string().contains("IO错误: 文件操作失败"));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
    let err: RecorderError = toml_err.into();

    assert!(matches!(err, RecorderError::Config { .. }));
    assert!(err.to_string().contains("配置错误: TOML解析失败"));
}

#[test]
fn test_auto_conversion_from_db_err() {
    let err: RecorderError = sea_orm::DbErr::Custom("boom".to_string()).into();
    assert!(matches!(err, RecorderError::Database { .. }));
    assert!(err.source().is_some());
}

#[test]
fn test_context_wraps_message() {
    let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "权限不足",
    ));

    let err = result.context("读取配置文件失败").unwrap_err();
    assert!(err.to_string().contains("读取配置文件失败"));
    assert!(err.to_string().contains("文件操作失败"));
}

#[test]
fn test_http_response_parts() {
    let (status, code) = RecorderError::cache("unreachable").to_http_response_parts();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(code, "CACHE_ERROR");

    let (status, code) = RecorderError::config("bad").to_http_response_parts();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "CONFIG_ERROR");
}

fn check_port(port: u16) -> Result<u16> {
    crate::ensure!(port != 0, Config, "无效的端口: {}", port);
    Ok(port)
}

#[test]
fn test_ensure_macro() {
    assert_eq!(check_port(8080).unwrap(), 8080);
    let err = check_port(0).unwrap_err();
    assert_eq!(err.to_string(), "配置错误: 无效的端口: 0");
}
