//! 死信通道
//!
//! 重试预算耗尽的消息以原始 key 和负载原样发布到专用死信 topic，
//! 供离线排查或人工重放。死信是终态：本系统不再消费、不再重试。
//!
//! 发布端为每条死信单独建立并释放一条生产者连接——死信是低频路径，
//! 用每次连接的开销换取不长期占用连接。

use async_trait::async_trait;
use tracing::warn;

use crate::config::KafkaConfig;
use crate::error::PipelineError;
use crate::kafka::{KafkaProducer, topics};

/// 死信发布接口
///
/// 消费循环通过该接口路由耗尽重试的消息；发布失败由调用方记录并吞掉，
/// 不会阻塞或终止消费循环（已无下一级通道可以兜底）。
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// 原样发布消息的 key 与负载
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError>;
}

/// 基于 Kafka 的死信发布器
///
/// 持有 Kafka 配置而非生产者实例；连接的获取与释放以单条死信为界。
pub struct KafkaDeadLetterSink {
    kafka: KafkaConfig,
}

impl KafkaDeadLetterSink {
    pub fn new(kafka: &KafkaConfig) -> Self {
        Self {
            kafka: kafka.clone(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError> {
        // 每条死信独立建连，发送完成即随 drop 释放
        let producer = KafkaProducer::new(&self.kafka)?;
        producer.send(topics::DEAD_LETTER, key, payload).await?;

        warn!(key, topic = topics::DEAD_LETTER, "消息已进入死信通道");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 内存死信实现，验证 trait 契约：key 与负载原样传递
    struct RecordingSink {
        records: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PipelineError> {
            self.records
                .lock()
                .unwrap()
                .push((key.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_preserves_key_and_payload() {
        let sink = RecordingSink {
            records: Mutex::new(Vec::new()),
        };
        let payload = br#"{"orderId":"OrderID-9"}"#;

        sink.publish("OrderID-9", payload).await.unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "OrderID-9");
        assert_eq!(records[0].1, payload);
    }
}
