//! 令牌桶限流器
//!
//! 进程内的消费速率控制：桶以固定速率补充令牌，容量即突发上限，
//! 取不到令牌时挂起在计时器上等待下一个令牌生成。
//!
//! 等待是 `tokio::time` 的计时器挂起而非线程阻塞，调用方可以用
//! `select!` 同时监听取消信号，在等待期间立即响应关闭。

use std::time::Duration;

use tokio::time::Instant;

/// 令牌桶
///
/// 仅供单个消费循环独占使用（`&mut self`），跨任务共享的限流
/// 不在本管道的需求内——消费端设计上就是单消息串行的。
#[derive(Debug)]
pub struct TokenBucket {
    /// 桶容量（突发上限）
    capacity: f64,
    /// 当前令牌数
    tokens: f64,
    /// 每秒补充的令牌数
    refill_per_sec: f64,
    /// 上次补充时刻
    last_refill: Instant,
}

impl TokenBucket {
    /// 创建令牌桶，初始为满桶
    ///
    /// 速率与容量都会被钳制到至少 1——零速率的桶会让消费循环
    /// 永久挂起，这不可能是有意配置。
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: rate_per_sec.max(1) as f64,
            last_refill: Instant::now(),
        }
    }

    /// 按流逝时间补充令牌，不超过容量
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// 取走一个令牌，必要时等待到下一个令牌生成
    ///
    /// 在等待中被取消不会消耗令牌，调用方可安全地对本方法做 select。
    pub async fn acquire(&mut self) {
        self.refill();

        if self.tokens < 1.0 {
            let deficit = 1.0 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            tokio::time::sleep(wait).await;
            self.refill();
        }

        self.tokens = (self.tokens - 1.0).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_paced() {
        let mut bucket = TokenBucket::new(5, 1);
        let start = Instant::now();

        // 满桶，首个令牌立即可用
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // 第二个令牌需等待 1/5 秒
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_capacity() {
        let mut bucket = TokenBucket::new(5, 3);
        let start = Instant::now();

        // 容量 3，前三个令牌不等待
        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::new(5, 2);

        // 取空后闲置足够久，桶只回到容量而不会积攒更多
        bucket.acquire().await;
        bucket.acquire().await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // 第三个令牌又要按速率等待
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[test]
    fn test_zero_rate_clamped() {
        let bucket = TokenBucket::new(0, 0);
        assert!((bucket.refill_per_sec - 1.0).abs() < f64::EPSILON);
        assert!((bucket.capacity - 1.0).abs() < f64::EPSILON);
    }
}
