//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和提交语义，避免各服务重复编写样板代码。
//!
//! 消费端刻意不用自动提交：位点只在一条消息到达终态处置
//! （处理成功或已进死信通道）之后由调用方显式提交，
//! 保证任何已消费的消息都不会在未处置的情况下被跳过。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 Kafka topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    pub const ORDER_EVENTS: &str = "orderflow.orders.created";
    pub const DEAD_LETTER: &str = "orderflow.orders.deadletter";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, PipelineError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| PipelineError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| PipelineError::Kafka(format!("负载反序列化失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// 设置 `message.timeout.ms` 为 5 秒——订单事件 5 秒内仍无法投递时，
    /// 应由上层决定重试或中止，而非无限等待。
    pub fn new(config: &KafkaConfig) -> Result<Self, PipelineError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| PipelineError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), PipelineError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| PipelineError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    ///
    /// 序列化与网络发送拆分为两步，便于独立定位故障原因。
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), PipelineError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| PipelineError::Kafka(format!("序列化失败: {e}")))?;

        self.send(topic, key, &payload).await
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 单条拉取 + 显式提交：`recv` 返回一条拥有所有权的消息，
/// 调用方在消息到达终态处置后调用 `commit` 推进位点。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组。
    /// 单组单成员投递语义由 broker 的消费组机制保证。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self, PipelineError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| PipelineError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), PipelineError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| PipelineError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 拉取下一条消息
    ///
    /// 拉取失败意味着流连接异常，对消费循环是致命错误，由调用方上抛。
    pub async fn recv(&self) -> Result<ConsumerMessage, PipelineError> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| PipelineError::Kafka(format!("拉取消息失败: {e}")))?;

        let msg = ConsumerMessage::from_borrowed(&borrowed);
        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "收到 Kafka 消息"
        );
        Ok(msg)
    }

    /// 提交一条消息的位点（提交 offset + 1）
    ///
    /// 只在消息到达终态处置后调用；提交失败与拉取失败同级，
    /// 继续消费会导致重启后无界重放，因此同样上抛。
    pub fn commit(&self, msg: &ConsumerMessage) -> Result<(), PipelineError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| PipelineError::Kafka(format!("构造提交位点失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| PipelineError::Kafka(format!("提交位点失败: {e}")))?;

        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "位点已提交"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_constants() {
        assert_eq!(topics::ORDER_EVENTS, "orderflow.orders.created");
        assert_eq!(topics::DEAD_LETTER, "orderflow.orders.deadletter");
    }

    #[test]
    fn test_consumer_message_creation() {
        let msg = ConsumerMessage {
            topic: "test-topic".to_string(),
            partition: 0,
            offset: 42,
            key: Some("OrderID-1".to_string()),
            payload: b"hello".to_vec(),
            timestamp: Some(1_700_000_000_000),
            headers: HashMap::from([("trace-id".to_string(), "abc-123".to_string())]),
        };

        assert_eq!(msg.topic, "test-topic");
        assert_eq!(msg.offset, 42);
        assert_eq!(msg.key.as_deref(), Some("OrderID-1"));
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.headers.get("trace-id").unwrap(), "abc-123");
    }

    #[test]
    fn test_consumer_message_deserialize() {
        use crate::events::OrderCreated;

        let event = OrderCreated::new("OrderID-0", "test");
        let payload = serde_json::to_vec(&event).unwrap();

        let msg = ConsumerMessage {
            topic: topics::ORDER_EVENTS.to_string(),
            partition: 1,
            offset: 100,
            key: Some(event.order_id.clone()),
            payload,
            timestamp: None,
            headers: HashMap::new(),
        };

        let parsed: OrderCreated = msg.deserialize_payload().unwrap();
        assert_eq!(parsed.order_id, "OrderID-0");
    }

    #[test]
    fn test_consumer_message_deserialize_invalid_json() {
        let msg = ConsumerMessage {
            topic: "events".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: b"not json".to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        };

        let result: Result<serde_json::Value, _> = msg.deserialize_payload();
        assert!(result.is_err());
    }

    #[test]
    fn test_consumer_message_payload_str_invalid_utf8() {
        let msg = ConsumerMessage {
            topic: "test".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: vec![0xFF, 0xFE],
            timestamp: None,
            headers: HashMap::new(),
        };

        assert!(msg.payload_str().is_err());
    }
}
