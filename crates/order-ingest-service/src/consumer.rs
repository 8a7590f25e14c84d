//! 订单消费循环
//!
//! 管道的编排组件：在令牌桶限流下单条拉取消息，经重试策略调用
//! 订单处理器，重试耗尽的消息交给死信通道，终态处置完成后才提交位点。
//! 没有消息被静默丢弃：每条消息要么处理成功，要么进入死信通道。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use orderflow_shared::config::AppConfig;
use orderflow_shared::dlq::DeadLetterSink;
use orderflow_shared::kafka::{ConsumerMessage, KafkaConsumer, topics};
use orderflow_shared::rate_limit::TokenBucket;
use orderflow_shared::retry::{RetryPolicy, retry_with_policy};

use crate::error::IngestError;
use crate::processor::{OrderProcessor, ProcessOutcome};

/// 一条消息的终态处置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 首次处理成功
    Processed,
    /// 重投递的幂等空操作
    AlreadyProcessed,
    /// 重试耗尽（或无法处理），已路由到死信通道
    DeadLettered,
}

/// 订单事件消费者
///
/// 组合 KafkaConsumer（消息拉取）、OrderProcessor（业务处理）、
/// TokenBucket（限流）与 DeadLetterSink（死信路由），形成完整的消费管道。
pub struct OrderConsumer {
    consumer: KafkaConsumer,
    processor: OrderProcessor,
    sink: Arc<dyn DeadLetterSink>,
    limiter: TokenBucket,
    retry: RetryPolicy,
}

impl OrderConsumer {
    pub fn new(
        config: &AppConfig,
        processor: OrderProcessor,
        sink: Arc<dyn DeadLetterSink>,
    ) -> Result<Self, IngestError> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        let limiter = TokenBucket::new(config.pipeline.rate_per_sec, config.pipeline.rate_burst);
        let retry = RetryPolicy {
            max_attempts: config.pipeline.max_attempts,
            delay: Duration::from_secs(config.pipeline.retry_delay_secs),
            multiplier: config.pipeline.retry_multiplier,
            max_delay: Duration::from_secs(config.pipeline.retry_max_delay_secs),
        };

        Ok(Self {
            consumer,
            processor,
            sink,
            limiter,
            retry,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号或发生致命错误
    ///
    /// 单消息串行：一条消息完全处置并提交位点后才拉取下一条。
    /// 取消信号只在令牌等待和消息拉取两处被观察——一旦开始处理，
    /// 该消息会先到达终态处置，循环才退出。
    /// 拉取与提交失败是流连接故障，对循环致命，由监督者决定重启。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IngestError> {
        self.consumer.subscribe(&[topics::ORDER_EVENTS])?;

        info!(
            topic = topics::ORDER_EVENTS,
            max_attempts = self.retry.max_attempts,
            "订单消费循环已启动"
        );

        loop {
            // 等待限流令牌，期间可被关闭信号打断
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，订单消费循环退出");
                        break;
                    }
                    continue;
                }

                _ = self.limiter.acquire() => {}
            }

            // 拉取一条消息，期间同样可被关闭信号打断
            let msg = tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，订单消费循环退出");
                        break;
                    }
                    continue;
                }

                msg = self.consumer.recv() => msg?,
            };

            metrics::counter!("orders_consumed_total").increment(1);
            info!(
                key = msg.key.as_deref().unwrap_or(""),
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "收到订单消息"
            );

            let disposition =
                dispose(&self.processor, self.sink.as_ref(), &self.retry, &msg).await;

            info!(
                key = msg.key.as_deref().unwrap_or(""),
                offset = msg.offset,
                ?disposition,
                "消息处置完成"
            );

            // 终态处置之后才推进流位点
            self.consumer.commit(&msg)?;
        }

        info!("订单消费循环已停止");
        Ok(())
    }
}

/// 对一条消息执行到终态处置
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 返回值即该消息的终态；本函数从不丢弃消息。
pub async fn dispose(
    processor: &OrderProcessor,
    sink: &dyn DeadLetterSink,
    retry: &RetryPolicy,
    msg: &ConsumerMessage,
) -> Disposition {
    // 没有订单 key 的消息无法处理也无从重试，直接隔离到死信通道
    let Some(order_id) = msg.key.clone() else {
        let err = IngestError::MissingKey {
            topic: msg.topic.clone(),
            offset: msg.offset,
        };
        warn!(error = %err, error_code = err.code(), "消息无法处理，直接进入死信通道");
        publish_dead_letter(sink, "", &msg.payload).await;
        return Disposition::DeadLettered;
    };

    match retry_with_policy(retry, "process_order", || processor.process(&order_id)).await {
        Ok(ProcessOutcome::Processed) => {
            metrics::counter!("orders_processed_total").increment(1);
            Disposition::Processed
        }
        Ok(ProcessOutcome::AlreadyProcessed) => {
            metrics::counter!("orders_already_processed_total").increment(1);
            Disposition::AlreadyProcessed
        }
        Err(exhausted) => {
            error!(
                order_id,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                error_code = exhausted.last_error.code(),
                "重试预算耗尽，路由到死信通道"
            );
            publish_dead_letter(sink, &order_id, &msg.payload).await;
            Disposition::DeadLettered
        }
    }
}

/// 发布死信并吞掉发布失败
///
/// 死信发布失败意味着消息在主通道与死信通道都已丢失——
/// 没有下一级通道可以兜底，记录日志与指标后接受这一降级。
async fn publish_dead_letter(sink: &dyn DeadLetterSink, key: &str, payload: &[u8]) {
    match sink.publish(key, payload).await {
        Ok(()) => {
            metrics::counter!("orders_dead_lettered_total").increment(1);
        }
        Err(e) => {
            metrics::counter!("dead_letter_publish_failures_total").increment(1);
            error!(key, error = %e, "死信发布失败，消息在两条通道上都已丢失");
        }
    }
}
