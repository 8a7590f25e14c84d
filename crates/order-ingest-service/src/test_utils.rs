//! 测试工具模块
//!
//! 提供订单管道测试所需的内存版存取实现与记录式死信替身。
//! `MemoryStatusCache` 用 tokio 时钟实现锁 TTL，配合
//! `#[tokio::test(start_paused = true)]` 可以精确驱动锁过期场景。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use orderflow_shared::dlq::DeadLetterSink;
use orderflow_shared::error::PipelineError;
use orderflow_shared::events::OrderStatus;

use crate::stores::{OrderStore, StatusCache};

// ---------------------------------------------------------------------------
// MemoryStatusCache — 内存版快速缓存
// ---------------------------------------------------------------------------

/// 内存版 StatusCache
///
/// 状态表与锁表分开存放；锁表记录过期时刻，读取时惰性清理，
/// 语义与 Redis 的 SET NX EX 对齐。
#[derive(Default)]
pub struct MemoryStatusCache {
    statuses: Mutex<HashMap<String, OrderStatus>>,
    locks: Mutex<HashMap<String, Instant>>,
}

impl MemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn status(&self, order_id: &str) -> Result<Option<OrderStatus>, PipelineError> {
        Ok(self.statuses.lock().unwrap().get(order_id).copied())
    }

    async fn record_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), PipelineError> {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), status);
        Ok(())
    }

    async fn clear_status(&self, order_id: &str) -> Result<(), PipelineError> {
        self.statuses.lock().unwrap().remove(order_id);
        Ok(())
    }

    async fn acquire_lock(&self, order_id: &str, ttl: Duration) -> Result<bool, PipelineError> {
        let mut locks = self.locks.lock().unwrap();
        let now = Instant::now();

        // 惰性清理已过期的锁
        locks.retain(|_, expires_at| *expires_at > now);

        if locks.contains_key(order_id) {
            return Ok(false);
        }
        locks.insert(order_id.to_string(), now + ttl);
        Ok(true)
    }

    async fn release_lock(&self, order_id: &str) -> Result<(), PipelineError> {
        self.locks.lock().unwrap().remove(order_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryOrderStore — 内存版持久存储
// ---------------------------------------------------------------------------

/// 内存版 OrderStore
///
/// 统计成功写入次数与全部写入尝试次数，并支持按订单注入永久性故障，
/// 用于验证"重试确实到达存储"与"死信前没有残留状态"两类断言。
#[derive(Default)]
pub struct MemoryOrderStore {
    rows: Mutex<HashMap<String, OrderStatus>>,
    failing: Mutex<HashSet<String>>,
    writes: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入永久性故障：对该订单的写入始终失败
    pub fn fail_order(&self, order_id: &str) {
        self.failing.lock().unwrap().insert(order_id.to_string());
    }

    /// 解除故障注入
    pub fn recover_order(&self, order_id: &str) {
        self.failing.lock().unwrap().remove(order_id);
    }

    /// 成功写入的总次数
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// 写入尝试总次数（含失败）
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 读取某订单的当前持久状态
    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.rows.lock().unwrap().get(order_id).copied()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn put_status(&self, order_id: &str, status: OrderStatus) -> Result<(), PipelineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(order_id) {
            return Err(PipelineError::Internal(format!(
                "注入的存储故障: {order_id}"
            )));
        }

        self.rows.lock().unwrap().insert(order_id.to_string(), status);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDeadLetterSink — 记录式死信替身
// ---------------------------------------------------------------------------

/// 记录式死信实现
///
/// 保存收到的 (key, payload) 以便断言原样保留；可切换为全部失败，
/// 用于验证死信发布失败不会中断消费循环。
#[derive(Default)]
pub struct RecordingDeadLetterSink {
    records: Mutex<Vec<(String, Vec<u8>)>>,
    fail_all: Mutex<bool>,
}

impl RecordingDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续所有发布都失败
    pub fn fail_publishes(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    /// 收到的全部死信记录
    pub fn records(&self) -> Vec<(String, Vec<u8>)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetterSink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError> {
        if *self.fail_all.lock().unwrap() {
            return Err(PipelineError::Kafka("注入的死信发布故障".to_string()));
        }

        self.records
            .lock()
            .unwrap()
            .push((key.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 内存锁实现与 SET NX EX 语义对齐：同键互斥、过期可重取
    #[tokio::test(start_paused = true)]
    async fn test_memory_lock_semantics() {
        let cache = MemoryStatusCache::new();
        let ttl = Duration::from_secs(10);

        assert!(cache.acquire_lock("OrderID-1", ttl).await.unwrap());
        assert!(!cache.acquire_lock("OrderID-1", ttl).await.unwrap());
        // 不同订单互不影响
        assert!(cache.acquire_lock("OrderID-2", ttl).await.unwrap());

        // 显式释放后立即可重取
        cache.release_lock("OrderID-1").await.unwrap();
        assert!(cache.acquire_lock("OrderID-1", ttl).await.unwrap());

        // 从不释放的锁在 TTL 过后可重取
        tokio::time::advance(ttl).await;
        assert!(cache.acquire_lock("OrderID-1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryOrderStore::new();
        store.fail_order("OrderID-9");

        assert!(
            store
                .put_status("OrderID-9", OrderStatus::Processed)
                .await
                .is_err()
        );
        assert_eq!(store.attempt_count(), 1);
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.status_of("OrderID-9"), None);
    }
}
