//! 订单处理器
//!
//! 对单条订单执行完整的处理流程：获取单订单锁 -> 幂等检查 ->
//! 写缓存状态 -> 写持久状态 -> 释放锁。同一订单的并发尝试由锁全序化，
//! 不同订单之间完全并行、无共享可变状态。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use orderflow_shared::events::OrderStatus;

use crate::error::IngestError;
use crate::stores::{OrderStore, StatusCache};

/// 单次处理的结果
///
/// 区分真正的首次处理与幂等空操作，重投递场景的测试与指标依赖这一区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 首次处理完成，状态已写入缓存与持久存储
    Processed,
    /// 订单已有处理状态，本次为幂等空操作
    AlreadyProcessed,
}

/// 订单处理器
///
/// 对外只有 `process` 一个入口；锁的获取与释放完全封装在内部，
/// 任何返回路径都会释放锁，持有者崩溃的场景由锁的 TTL 兜底。
pub struct OrderProcessor {
    cache: Arc<dyn StatusCache>,
    store: Arc<dyn OrderStore>,
    lock_ttl: Duration,
}

impl OrderProcessor {
    pub fn new(
        cache: Arc<dyn StatusCache>,
        store: Arc<dyn OrderStore>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            lock_ttl,
        }
    }

    /// 处理一条订单
    ///
    /// 锁竞争（重投递的消息与自身重试竞速）返回 `LockContended`，
    /// 由重试执行器按瞬时失败处理，而不是带锁并发写同一订单。
    pub async fn process(&self, order_id: &str) -> Result<ProcessOutcome, IngestError> {
        metrics::counter!("order_processing_attempts_total").increment(1);

        if !self.cache.acquire_lock(order_id, self.lock_ttl).await? {
            debug!(order_id, "订单锁被占用，本次尝试按可重试失败处理");
            return Err(IngestError::LockContended {
                order_id: order_id.to_string(),
            });
        }

        let result = self.apply(order_id).await;

        // 成功与失败路径都在此释放锁；释放本身失败时由 TTL 过期兜底
        if let Err(e) = self.cache.release_lock(order_id).await {
            warn!(order_id, error = %e, "释放订单锁失败，将由 TTL 过期兜底");
        }

        result
    }

    /// 持锁状态下的幂等检查与状态写入
    async fn apply(&self, order_id: &str) -> Result<ProcessOutcome, IngestError> {
        if let Some(status) = self.cache.status(order_id).await? {
            info!(order_id, %status, "订单已有处理状态，幂等跳过");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        debug!(order_id, "订单未处理，开始持久化状态");

        // 先写缓存再写持久存储
        self.cache
            .record_status(order_id, OrderStatus::Processed)
            .await?;

        if let Err(e) = self.store.put_status(order_id, OrderStatus::Processed).await {
            // 撤掉刚写入的幂等标记，否则下一次尝试会被误判为已处理，
            // 持久存储将永远收不到这条订单
            if let Err(clear_err) = self.cache.clear_status(order_id).await {
                warn!(
                    order_id,
                    error = %clear_err,
                    "回滚幂等标记失败，后续重试可能被误判为已处理"
                );
            }
            return Err(e.into());
        }

        info!(order_id, status = %OrderStatus::Processed, "订单状态已写入缓存与持久存储");
        Ok(ProcessOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{MockOrderStore, MockStatusCache};
    use crate::test_utils::{MemoryOrderStore, MemoryStatusCache};
    use orderflow_shared::error::PipelineError;

    const LOCK_TTL: Duration = Duration::from_secs(10);

    fn make_processor(
        cache: Arc<MemoryStatusCache>,
        store: Arc<MemoryOrderStore>,
    ) -> OrderProcessor {
        OrderProcessor::new(cache, store, LOCK_TTL)
    }

    /// 幂等性：同一订单处理两次，第二次是空操作，不产生额外的持久写入
    #[tokio::test]
    async fn test_idempotent_reprocessing() {
        let cache = Arc::new(MemoryStatusCache::new());
        let store = Arc::new(MemoryOrderStore::new());
        let processor = make_processor(cache.clone(), store.clone());

        let first = processor.process("OrderID-1").await.unwrap();
        assert_eq!(first, ProcessOutcome::Processed);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.status_of("OrderID-1"), Some(OrderStatus::Processed));

        let second = processor.process("OrderID-1").await.unwrap();
        assert_eq!(second, ProcessOutcome::AlreadyProcessed);
        // 第二次没有触发任何持久写入
        assert_eq!(store.write_count(), 1);
    }

    /// 互斥：锁被另一个尝试持有时，本次处理失败且可重试，不会写任何状态
    #[tokio::test]
    async fn test_lock_contention_fails_attempt() {
        let cache = Arc::new(MemoryStatusCache::new());
        let store = Arc::new(MemoryOrderStore::new());
        let processor = make_processor(cache.clone(), store.clone());

        // 模拟并发中的另一个尝试先取得锁
        assert!(cache.acquire_lock("OrderID-2", LOCK_TTL).await.unwrap());

        let err = processor.process("OrderID-2").await.unwrap_err();
        assert!(matches!(err, IngestError::LockContended { .. }));
        assert_eq!(store.write_count(), 0);

        // 对方释放后重试成功
        cache.release_lock("OrderID-2").await.unwrap();
        let outcome = processor.process("OrderID-2").await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
    }

    /// 锁过期：持有者不释放，TTL 过后其他尝试可以重新取得
    #[tokio::test(start_paused = true)]
    async fn test_lock_expiry_unblocks_next_attempt() {
        let cache = Arc::new(MemoryStatusCache::new());
        let store = Arc::new(MemoryOrderStore::new());
        let processor = make_processor(cache.clone(), store.clone());

        // 持有者"崩溃"：取得锁后从不释放
        assert!(cache.acquire_lock("OrderID-3", LOCK_TTL).await.unwrap());
        assert!(matches!(
            processor.process("OrderID-3").await.unwrap_err(),
            IngestError::LockContended { .. }
        ));

        // TTL 过后锁自动失效，处理可以继续
        tokio::time::advance(LOCK_TTL).await;
        let outcome = processor.process("OrderID-3").await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
    }

    /// 持久写入失败会回滚幂等标记，下一次尝试能再次到达持久存储
    #[tokio::test]
    async fn test_store_failure_rolls_back_cache_marker() {
        let cache = Arc::new(MemoryStatusCache::new());
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_order("OrderID-4");
        let processor = make_processor(cache.clone(), store.clone());

        let err = processor.process("OrderID-4").await.unwrap_err();
        assert!(matches!(err, IngestError::Shared(_)));

        // 幂等标记已撤销，状态保持"不存在"
        assert_eq!(cache.status("OrderID-4").await.unwrap(), None);
        assert_eq!(store.status_of("OrderID-4"), None);

        // 故障排除后重试，持久存储真正收到写入
        store.recover_order("OrderID-4");
        let outcome = processor.process("OrderID-4").await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        assert_eq!(store.status_of("OrderID-4"), Some(OrderStatus::Processed));
    }

    /// 缓存写入失败同样是处理失败，且锁在失败路径上也被释放
    #[tokio::test]
    async fn test_cache_write_failure_still_releases_lock() {
        let mut cache = MockStatusCache::new();
        cache.expect_acquire_lock().times(1).returning(|_, _| Ok(true));
        cache.expect_status().times(1).returning(|_| Ok(None));
        cache
            .expect_record_status()
            .times(1)
            .returning(|_, _| Err(PipelineError::Internal("缓存写入失败".to_string())));
        // 失败路径上锁必须被释放
        cache.expect_release_lock().times(1).returning(|_| Ok(()));

        let mut store = MockOrderStore::new();
        store.expect_put_status().never();

        let processor = OrderProcessor::new(Arc::new(cache), Arc::new(store), LOCK_TTL);
        let err = processor.process("OrderID-5").await.unwrap_err();
        assert!(matches!(err, IngestError::Shared(_)));
    }

    /// 永久性存储故障下，每次尝试都会真正到达持久存储
    #[tokio::test]
    async fn test_permanent_store_failure_retries_reach_store() {
        let cache = Arc::new(MemoryStatusCache::new());
        let mut store = MockOrderStore::new();
        store
            .expect_put_status()
            .times(2)
            .returning(|_, _| Err(PipelineError::Internal("存储不可用".to_string())));

        let processor = OrderProcessor::new(cache, Arc::new(store), LOCK_TTL);

        assert!(processor.process("OrderID-6").await.is_err());
        // 第二次尝试没有被幂等标记挡住，仍然到达存储
        assert!(processor.process("OrderID-6").await.is_err());
    }
}
