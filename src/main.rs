//! # SQL Recorder 主程序
//!
//! 启动带录制中间件的管理服务器

use std::sync::Arc;

use sql_recorder::{
    RecorderService, Result,
    config::ConfigManager,
    error::Context,
    database, lerror, linfo,
    logging::{self, LogComponent, LogStage},
    management::{AppState, ManagementServer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    logging::init_optimized_logging(None);

    if let Err(e) = run().await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }

    linfo!("system", LogStage::Shutdown, LogComponent::Main, "service_shutdown", "服务正常关闭");
    Ok(())
}

async fn run() -> Result<()> {
    let config = Arc::new(ConfigManager::new()?.into_config());

    let db = database::init_database(&config.database)
        .await
        .context("初始化宿主数据库失败")?;
    let recorder = RecorderService::from_config(&config.cache, config.recorder.clone())
        .await
        .with_context(|| format!("初始化录制存储失败 (cache_type = {:?})", config.cache.cache_type))?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        cache_type = config.cache.cache_type,
        port = config.server.port
    );

    let state = AppState::new(Arc::clone(&config), Arc::new(recorder), Arc::new(db));
    ManagementServer::new(state).serve().await
}
