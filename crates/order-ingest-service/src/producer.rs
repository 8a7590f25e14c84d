//! 种子订单生产者
//!
//! 以固定节奏发送一批合成的订单创建事件，用于演示与压种子流量。
//! 任何一次发送失败都中止整个生产任务——生产端失败意味着流连接
//! 已断开，而不是单条消息的瞬时问题。

use std::time::Duration;

use tracing::info;

use orderflow_shared::config::AppConfig;
use orderflow_shared::events::OrderCreated;
use orderflow_shared::kafka::{KafkaProducer, topics};

use crate::error::IngestError;

/// 构造第 n 条种子订单事件
///
/// key 即订单 ID，消费端只依赖 key；信封冗余一份便于排查。
pub fn seed_event(n: u32) -> OrderCreated {
    OrderCreated::new(format!("OrderID-{n}"), "order-ingest-service")
}

/// 种子订单生产者
pub struct OrderProducer {
    producer: KafkaProducer,
    seed_count: u32,
    pacing: Duration,
}

impl OrderProducer {
    pub fn new(config: &AppConfig) -> Result<Self, IngestError> {
        Ok(Self {
            producer: KafkaProducer::new(&config.kafka)?,
            seed_count: config.producer.seed_count,
            pacing: Duration::from_secs(config.producer.pacing_secs),
        })
    }

    /// 发送全部种子事件后返回
    pub async fn run(self) -> Result<(), IngestError> {
        info!(
            count = self.seed_count,
            pacing_secs = self.pacing.as_secs(),
            "种子订单生产者已启动"
        );

        // interval 的首个 tick 立即返回，之后按固定间隔触发
        let mut ticker = tokio::time::interval(self.pacing);

        for n in 0..self.seed_count {
            ticker.tick().await;

            let event = seed_event(n);
            self.producer
                .send_json(topics::ORDER_EVENTS, &event.order_id, &event)
                .await?;

            info!(order_id = %event.order_id, "订单事件已发送");
        }

        info!(count = self.seed_count, "种子订单生产完成");
        Ok(())
    }
}
