//! 订单摄取服务
//!
//! 消费 Kafka 中的订单创建事件，在限流与单订单分布式锁的约束下
//! 幂等地把处理状态物化到缓存与持久存储；瞬时故障有界重试，
//! 重试耗尽的消息隔离到死信通道。

pub mod consumer;
pub mod error;
pub mod processor;
pub mod producer;
pub mod stores;
pub mod test_utils;
