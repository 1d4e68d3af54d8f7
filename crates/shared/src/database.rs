//! PostgreSQL 连接池
//!
//! 连接建立后立即 ping 一次，启动阶段就能暴露配置错误；迁移脚本由服务自行嵌入。

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)?;
        let target = describe_target(&options);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        let latency = db.ping().await?;
        info!(
            target_db = %target,
            max_connections = config.max_connections,
            latency_ms = latency.as_millis() as u64,
            "Database pool ready"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次往返查询，返回耗时
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(start.elapsed())
    }

    #[instrument(skip_all)]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        let start = Instant::now();
        migrator.run(&self.pool).await?;
        info!(
            migrations = migrator.iter().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Database migrations applied"
        );
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// host:port/database，不含凭据，用于日志
fn describe_target(options: &PgConnectOptions) -> String {
    format!(
        "{}:{}/{}",
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or("-")
    )
}
