//! 积分兑换服务
//!
//! 提供兑换、领取、成就与后台管理的 REST API 服务入口。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use redemption::{
    AppState, ExpireWorker, MIGRATOR, MemoryStore, PgStore, RewardsStore, build_router,
    notification::{Mailer, mailer},
};
use rewards_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

const SERVICE_NAME: &str = "redemption-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载配置：config/{default,环境,服务}.toml + REWARDS_ 环境变量
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        backend = ?config.storage.backend,
        "Starting {} on {}",
        SERVICE_NAME,
        config.server_addr()
    );

    // 3. 邮件发送器：未配置网关时只记录日志
    let mailer: Arc<dyn Mailer> =
        Arc::from(mailer::from_config(&config.mail).context("初始化邮件发送器失败")?);

    // 4. 按配置选择存储后端
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            if config.database.run_migrations {
                db.run_migrations(&MIGRATOR).await?;
            }
            let store = Arc::new(PgStore::new(db.pool().clone()));
            serve(&config, store, mailer).await?;
            db.close().await;
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data will be lost on restart");
            serve(&config, Arc::new(MemoryStore::new()), mailer).await?;
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn serve<S: RewardsStore>(
    config: &AppConfig,
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
) -> anyhow::Result<()> {
    let state = AppState::new(store, mailer, &config.redemption);

    // 5. 后台过期处理 Worker
    let worker_handle = if config.worker.enabled {
        let worker = ExpireWorker::from_config(state.redemptions.clone(), &config.worker);
        Some(tokio::spawn(async move { worker.run().await }))
    } else {
        info!("Expire worker disabled");
        None
    };

    let app = with_http_layers(build_router(state), config);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM 或 Ctrl+C 后停止接收新连接，等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        handle.abort();
    }
    Ok(())
}

fn with_http_layers(router: Router, config: &AppConfig) -> Router {
    let cors = if config.is_production() {
        CorsLayer::new()
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    router
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
