//! 订单事件模型
//!
//! 定义进入管道的订单创建事件信封与订单处理状态。
//! 事件以订单 ID 作为 Kafka 消息 key，信封本身只承载审计所需的元数据，
//! 处理逻辑不依赖信封内容——死信通道因此可以原样保留任意负载。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderStatus — 订单处理状态
// ---------------------------------------------------------------------------

/// 订单处理状态
///
/// 生命周期：状态在首次成功处理前不存在；一旦写为 Processed 便不再回退，
/// 重复处理同一订单是幂等的空操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Unprocessed,
    Processed,
}

impl OrderStatus {
    /// 持久化到数据库 status 列的文本形式，与 serde 线上格式一致
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "UNPROCESSED",
            Self::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrderCreated — 订单创建事件信封
// ---------------------------------------------------------------------------

/// 订单创建事件信封
///
/// 消息 key 即订单 ID，是消费端唯一依赖的字段；信封冗余携带一份
/// 便于在死信通道或日志里独立于 key 进行排查。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    /// 订单唯一标识
    pub order_id: String,
    /// 事件产生时间
    pub created_at: DateTime<Utc>,
    /// 事件来源系统
    pub source: String,
}

impl OrderCreated {
    pub fn new(order_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            created_at: Utc::now(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::Processed).unwrap();
        assert_eq!(json, r#""PROCESSED""#);

        let parsed: OrderStatus = serde_json::from_str(r#""UNPROCESSED""#).unwrap();
        assert_eq!(parsed, OrderStatus::Unprocessed);
        assert_eq!(OrderStatus::Processed.as_str(), "PROCESSED");
    }

    #[test]
    fn test_order_created_roundtrip() {
        let event = OrderCreated::new("OrderID-3", "order-ingest-service");
        let json = serde_json::to_string(&event).unwrap();

        // 验证 camelCase 序列化
        assert!(json.contains("orderId"));
        assert!(json.contains("createdAt"));

        let parsed: OrderCreated = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.order_id, "OrderID-3");
        assert_eq!(parsed.source, "order-ingest-service");
    }
}
