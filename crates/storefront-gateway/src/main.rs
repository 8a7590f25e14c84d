//! 店铺平台网关服务
//!
//! 注册并处理商品更新 webhook，承载 OAuth 回调。

use std::sync::Arc;

use orderflow_shared::{cache::Cache, config::AppConfig, database::Database, observability};
use storefront_gateway::{api::StorefrontClient, routes, state::AppState};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("storefront-gateway").unwrap_or_default();
    config.validate()?;
    // 平台凭据没有合理默认值，缺失即启动失败
    let settings = Arc::new(config.storefront.require()?);

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting storefront-gateway on {}", config.server_addr());

    // 初始化基础设施
    let cache = Arc::new(Cache::new(&config.redis)?);
    let db = Database::connect(&config.database).await?;
    db.ensure_schema().await?;

    // 启动期向平台注册商品更新 webhook；失败说明凭据或网络有问题，
    // 网关跑起来也收不到回调，直接退出
    let client = StorefrontClient::new(&settings);
    client
        .register_product_update_webhook(&settings.webhook_url)
        .await?;

    let state = AppState::new(db.pool().clone(), cache, settings);
    let app = routes::router(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Gateway listening, waiting for webhooks...");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号，网关停止接收新请求");
        })
        .await?;

    db.close().await;
    info!("storefront-gateway 已退出");
    Ok(())
}
