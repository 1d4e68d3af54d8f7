//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标描述（出现在 /metrics 的 HELP 注释中）
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("redemptions_total", "Total number of redemption attempts");
    metrics::describe_histogram!(
        "redemption_duration_seconds",
        "Redemption duration in seconds"
    );
    metrics::describe_counter!(
        "redemption_collections_total",
        "Total number of collection attempts by outcome"
    );
    metrics::describe_counter!(
        "redemptions_expired_total",
        "Total number of redemptions moved to expired"
    );
    metrics::describe_counter!(
        "achievement_grants_total",
        "Total number of achievements granted"
    );
    metrics::describe_counter!("mail_deliveries_total", "Total number of mail deliveries");
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last background worker run"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录兑换尝试
///
/// status 取错误码的小写形式或 "success"
#[inline]
pub fn record_redemption(reward_id: i64, status: &str, duration_secs: f64) {
    metrics::counter!(
        "redemptions_total",
        "reward_id" => reward_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "redemption_duration_seconds",
        "reward_id" => reward_id.to_string()
    )
    .record(duration_secs);
}

/// 记录领取尝试
#[inline]
pub fn record_collection(outcome: &str) {
    metrics::counter!(
        "redemption_collections_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录过期处理数量
#[inline]
pub fn record_expiration(source: &str, count: u64) {
    metrics::counter!(
        "redemptions_expired_total",
        "source" => source.to_string()
    )
    .increment(count);
}

/// 记录成就发放
#[inline]
pub fn record_achievement_grant(achievement_type: &str) {
    metrics::counter!(
        "achievement_grants_total",
        "type" => achievement_type.to_string()
    )
    .increment(1);
}

/// 记录邮件投递结果
#[inline]
pub fn record_mail_delivery(status: &str) {
    metrics::counter!(
        "mail_deliveries_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!(
        "worker_last_run_timestamp",
        "worker" => worker.to_string()
    )
    .set(chrono::Utc::now().timestamp() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/rewards", 200, 0.1);
        record_redemption(1, "success", 0.3);
        record_redemption(1, "total_cap_exceeded", 0.01);
        record_collection("collected");
        record_expiration("sweep", 3);
        record_achievement_grant("first_redemption");
        record_mail_delivery("failed");
        set_worker_last_run("expire_worker");
    }

    #[test]
    fn test_handle_absent_before_init() {
        // 单元测试进程内不会安装 recorder
        assert!(get_handle().is_none());
    }
}
