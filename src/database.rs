//! # 数据库模块
//!
//! 宿主应用的数据库连接，录制器拦截的就是经由它发出的调用

use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::DatabaseConfig;
use crate::error::{RecorderError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connect",
        &format!("正在连接数据库: {}", config.url)
    );

    // SQLite 文件数据库：确保目录和文件存在
    if config.is_sqlite() && !config.is_memory_database() {
        config.ensure_database_path()?;
        let path = config
            .url
            .strip_prefix("sqlite://")
            .or_else(|| config.url.strip_prefix("sqlite:"))
            .unwrap_or(&config.url);
        let path = Path::new(path.split('?').next().unwrap_or(path));
        if !path.exists() {
            std::fs::File::create(path).map_err(|e| {
                RecorderError::database_with_source(format!("无法创建数据库文件: {}", path.display()), e)
            })?;
            ldebug!(
                "system",
                LogStage::Db,
                LogComponent::Database,
                "create_db_file",
                &format!("创建数据库文件: {}", path.display())
            );
        }
    }

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| RecorderError::database_with_source("数据库连接失败", e))?;

    linfo!("system", LogStage::Db, LogComponent::Database, "connected", "数据库连接成功");
    Ok(db)
}
