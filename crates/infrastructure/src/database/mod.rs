pub mod mapping;
pub mod migrations;
pub mod sqlite;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use task_assigning_config::DatabaseConfig;
use task_assigning_errors::TaskAssigningResult;
use tracing::{debug, info};

use sqlite::{SqliteTaskQueryHelper, SqliteTaskRepository, SqliteUnitOfWorkFactory};

pub type DbPool = Pool<Sqlite>;

/// 是否为内存数据库地址
pub fn is_in_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> TaskAssigningResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        // 内存数据库只存在于单个连接中，连接不能被回收
        if is_in_memory_url(&config.url) {
            debug!("使用内存数据库，连接池固定为单连接");
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .max_lifetime(Duration::from_secs(1800)); // 30分钟默认生命周期
        }

        let pool = pool_options.connect_with(connect_options).await?;
        info!("已连接数据库: {}", config.url);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> TaskAssigningResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> TaskAssigningResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn unit_of_work_factory(&self) -> Arc<SqliteUnitOfWorkFactory> {
        Arc::new(SqliteUnitOfWorkFactory::new(self.pool.clone()))
    }

    pub fn task_query_service(&self) -> Arc<SqliteTaskQueryHelper> {
        Arc::new(SqliteTaskQueryHelper::new(self.pool.clone()))
    }

    pub fn task_repository(&self) -> SqliteTaskRepository {
        SqliteTaskRepository::new(self.pool.clone())
    }
}
