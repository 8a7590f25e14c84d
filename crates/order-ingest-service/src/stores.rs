//! 订单状态的存取缝隙
//!
//! 处理器通过 `StatusCache`（快速缓存：幂等标记 + 单订单锁）和
//! `OrderStore`（持久存储：状态 upsert）两个 trait 与外部系统交互，
//! 生产实现分别落在 Redis 与 PostgreSQL 上，测试替身见 `test_utils`。

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use orderflow_shared::cache::{Cache, CacheKey};
use orderflow_shared::error::PipelineError;
use orderflow_shared::events::OrderStatus;

// ---------------------------------------------------------------------------
// StatusCache — 快速缓存缝隙
// ---------------------------------------------------------------------------

/// 幂等状态与单订单锁的快速缓存接口
///
/// 锁语义：`acquire_lock` 是原子的 set-if-absent，返回是否取得；
/// 取得者负责 `release_lock`，崩溃场景由 TTL 过期兜底释放。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// 读取订单处理状态；键不存在返回 `Ok(None)`
    async fn status(&self, order_id: &str) -> Result<Option<OrderStatus>, PipelineError>;

    /// 写入订单处理状态（永不过期）
    async fn record_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), PipelineError>;

    /// 撤销订单处理状态标记
    async fn clear_status(&self, order_id: &str) -> Result<(), PipelineError>;

    /// 原子地尝试获取单订单锁，返回是否取得
    async fn acquire_lock(&self, order_id: &str, ttl: Duration) -> Result<bool, PipelineError>;

    /// 释放单订单锁
    async fn release_lock(&self, order_id: &str) -> Result<(), PipelineError>;
}

/// 基于 Redis 的 StatusCache 实现
#[derive(Clone)]
pub struct RedisStatusCache {
    cache: Cache,
}

impl RedisStatusCache {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn status(&self, order_id: &str) -> Result<Option<OrderStatus>, PipelineError> {
        self.cache.get(&CacheKey::order_status(order_id)).await
    }

    async fn record_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), PipelineError> {
        // TTL 为零：状态条目永不过期
        self.cache
            .set(&CacheKey::order_status(order_id), &status, Duration::ZERO)
            .await
    }

    async fn clear_status(&self, order_id: &str) -> Result<(), PipelineError> {
        self.cache.delete(&CacheKey::order_status(order_id)).await
    }

    async fn acquire_lock(&self, order_id: &str, ttl: Duration) -> Result<bool, PipelineError> {
        let acquired = self
            .cache
            .set_nx(&CacheKey::order_lock(order_id), &"locked", ttl)
            .await?;

        debug!(order_id, acquired, "尝试获取订单锁");
        Ok(acquired)
    }

    async fn release_lock(&self, order_id: &str) -> Result<(), PipelineError> {
        self.cache.delete(&CacheKey::order_lock(order_id)).await
    }
}

// ---------------------------------------------------------------------------
// OrderStore — 持久存储缝隙
// ---------------------------------------------------------------------------

/// 订单状态的持久存储接口
///
/// 键寻址的单行 upsert，不向管道暴露读改写竞争。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 以 upsert 语义写入订单状态
    async fn put_status(&self, order_id: &str, status: OrderStatus) -> Result<(), PipelineError>;
}

/// 基于 PostgreSQL 的 OrderStore 实现
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn put_status(&self, order_id: &str, status: OrderStatus) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, status, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (order_id)
            DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(order_id, %status, "订单状态已持久化");
        Ok(())
    }
}
