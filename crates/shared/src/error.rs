//! 统一错误处理模块
//!
//! 定义订单管道中所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! `is_retryable` 区分瞬时故障与致命故障：瞬时故障由重试执行器兜底，
//! 致命故障（流连接断开、配置缺失）直接上抛给监督者。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum PipelineError {
    // ==================== 持久存储错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    // ==================== 缓存错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(String),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// 获取错误码，用于日志与指标中的 error_code 字段
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 缓存/存储的写入失败属于瞬时故障，交给重试执行器处理；
    /// 配置缺失在启动期即应失败，永远不重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::Kafka(_) | Self::ExternalService { .. }
        )
    }
}
