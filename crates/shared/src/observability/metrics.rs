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
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的管道指标）
fn register_common_metrics(service_name: &str) {
    // 指标描述会出现在 /metrics 端点的 HELP 注释中

    metrics::describe_counter!(
        "orders_consumed_total",
        "Total number of order events pulled from the stream"
    );
    metrics::describe_counter!(
        "orders_processed_total",
        "Total number of orders processed successfully"
    );
    metrics::describe_counter!(
        "orders_already_processed_total",
        "Total number of redelivered orders resolved as idempotent no-ops"
    );
    metrics::describe_counter!(
        "orders_dead_lettered_total",
        "Total number of orders routed to the dead-letter channel"
    );
    metrics::describe_counter!(
        "dead_letter_publish_failures_total",
        "Dead-letter publishes that failed (message lost from both paths)"
    );
    metrics::describe_counter!(
        "order_processing_attempts_total",
        "Total processing attempts including retries"
    );
    metrics::describe_counter!(
        "webhook_requests_total",
        "Total number of storefront webhook deliveries handled"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_starts() {
        let config = ObservabilityConfig {
            service_name: "test-service".to_string(),
            // 端口 0 让系统分配空闲端口，避免测试间冲突
            metrics_port: 0,
            ..ObservabilityConfig::default()
        };

        let handle = init(&config).await;
        assert!(handle.is_ok());
    }
}
