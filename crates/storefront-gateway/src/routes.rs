//! 路由配置模块
//!
//! 显式构造 Router 实例并交给唯一的监听启动调用，
//! 不依赖任何进程级的隐式注册状态。

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{oauth, state::AppState, webhook};

/// 构建网关的全部路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/storefront/product/update",
            post(webhook::handle_product_update),
        )
        .route("/storefront/oauth/callback", get(oauth::oauth_callback))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
