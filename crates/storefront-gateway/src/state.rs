//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use sqlx::PgPool;

use orderflow_shared::cache::Cache;
use orderflow_shared::config::StorefrontSettings;

/// Axum 应用共享状态
///
/// 包含数据库连接池、缓存客户端、出站 HTTP 客户端与平台配置，
/// 通过 Clone/Arc 在 handler 间共享。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// Redis 缓存客户端
    pub cache: Arc<Cache>,
    /// 出站 HTTP 客户端（OAuth 令牌交换）
    pub http: reqwest::Client,
    /// 校验通过的平台配置
    pub settings: Arc<StorefrontSettings>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pool: PgPool, cache: Arc<Cache>, settings: Arc<StorefrontSettings>) -> Self {
        Self {
            pool,
            cache,
            http: reqwest::Client::new(),
            settings,
        }
    }
}
