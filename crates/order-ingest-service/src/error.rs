//! 订单摄取服务专用错误类型
//!
//! 在共享库 PipelineError 基础上定义本服务特有的错误变体，
//! 使上层可以精确区分"锁竞争/缺少 key/基础设施故障"等不同失败原因，
//! 而无需在共享库中为每个服务追加变体。

use orderflow_shared::error::PipelineError;

/// 订单摄取处理错误
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 同一订单的另一个处理尝试正持有锁（如重投递与自身重试竞速），
    /// 本次尝试按可重试失败处理而非并发写入
    #[error("订单锁被占用: {order_id}")]
    LockContended { order_id: String },

    /// 消息没有携带订单 key，无法确定处理对象
    #[error("消息缺少订单 key: topic={topic} offset={offset}")]
    MissingKey { topic: String, offset: i64 },

    /// 透传共享库错误，避免在每个 match 分支手动转换
    #[error(transparent)]
    Shared(#[from] PipelineError),
}

impl IngestError {
    /// 日志与指标中的 error_code 字段
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockContended { .. } => "LOCK_CONTENDED",
            Self::MissingKey { .. } => "MISSING_KEY",
            Self::Shared(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::LockContended {
            order_id: "OrderID-1".to_string(),
        };
        assert_eq!(err.to_string(), "订单锁被占用: OrderID-1");
        assert_eq!(err.code(), "LOCK_CONTENDED");

        let err = IngestError::MissingKey {
            topic: "orderflow.orders.created".to_string(),
            offset: 42,
        };
        assert_eq!(
            err.to_string(),
            "消息缺少订单 key: topic=orderflow.orders.created offset=42"
        );

        let shared = PipelineError::Kafka("broker 不可达".to_string());
        let err = IngestError::Shared(shared);
        assert_eq!(err.to_string(), "Kafka 错误: broker 不可达");
        assert_eq!(err.code(), "KAFKA_ERROR");
    }
}
