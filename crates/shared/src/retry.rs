//! 重试策略与执行器
//!
//! 为单条消息的处理提供有界重试：固定的总尝试次数预算，
//! 尝试之间等待可配置的延迟。默认倍数 1.0 即固定延迟；
//! 调大倍数即得到指数退避，二者只是配置差异而非代码差异。
//!
//! 预算耗尽时执行器返回 `RetryExhausted` 而不是直接抛出最后一个错误，
//! 调用方据此统一路由到死信通道。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// RetryPolicy — 重试策略配置
// ---------------------------------------------------------------------------

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 总尝试次数上限（含首次执行），至少为 1
    pub max_attempts: u32,
    /// 相邻两次尝试之间的基础等待时间
    pub delay: Duration,
    /// 每轮等待的倍数，1.0 为固定延迟
    pub multiplier: f64,
    /// 等待时间上限，防止指数曲线下等待过长
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 默认策略：最多尝试 3 次，次间等待 2 秒，固定延迟
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 计算第 N 次尝试失败后的等待时间（attempt 从 1 开始）
    ///
    /// 公式: delay * multiplier^(attempt-1)，结果不超过 max_delay。
    /// 使用 f64 运算后再转回 Duration，接受微秒级精度损失——
    /// 对秒级延迟场景而言完全可接受。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 在已完成 attempt 次尝试后是否允许再试一次
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

// ---------------------------------------------------------------------------
// RetryExhausted — 预算耗尽报告
// ---------------------------------------------------------------------------

/// 重试预算耗尽
///
/// 携带实际尝试次数与最后一次的错误，供调用方记录日志并路由死信。
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "尝试 {} 次后放弃: {}", self.attempts, self.last_error)
    }
}

// ---------------------------------------------------------------------------
// retry_with_policy — 带重试的异步执行器
// ---------------------------------------------------------------------------

/// 带重试的异步执行器
///
/// 每次尝试及其结果都带序号记录日志。尝试之间的等待是计时器挂起
/// 而非线程阻塞，消费循环的其余工作不受影响。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 1;

    loop {
        debug!(operation = operation_name, attempt, "开始尝试");

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) => {
                if !policy.allows_another(attempt) {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "已达最大尝试次数，放弃"
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "尝试失败，将在延迟后重试"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
