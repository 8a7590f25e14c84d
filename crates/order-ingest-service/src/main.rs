//! 订单摄取服务
//!
//! 消费 Kafka 订单创建事件，幂等地物化处理状态。

use std::sync::Arc;

use order_ingest_service::consumer::OrderConsumer;
use order_ingest_service::processor::OrderProcessor;
use order_ingest_service::producer::OrderProducer;
use order_ingest_service::stores::{PgOrderStore, RedisStatusCache};
use orderflow_shared::{
    cache::Cache, config::AppConfig, database::Database, dlq::KafkaDeadLetterSink, observability,
};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置；必需项缺失在任何消息被处理之前就失败
    let config = AppConfig::load("order-ingest-service").unwrap_or_default();
    config.validate()?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting order-ingest-service...");

    // 初始化基础设施
    let cache = Cache::new(&config.redis)?;
    let db = Database::connect(&config.database).await?;
    db.ensure_schema().await?;

    // 组装管道：Redis 幂等/锁 + Postgres 状态表 + Kafka 死信通道
    let status_cache = Arc::new(RedisStatusCache::new(cache.clone()));
    let order_store = Arc::new(PgOrderStore::new(db.pool().clone()));
    let processor = OrderProcessor::new(status_cache, order_store, config.pipeline.lock_ttl());
    let sink = Arc::new(KafkaDeadLetterSink::new(&config.kafka));

    let consumer = OrderConsumer::new(&config, processor, sink)?;
    let producer = OrderProducer::new(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 受监督的任务：持有 JoinHandle，失败会被 await 到并上抛，而非只留日志
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));
    let producer_task = tokio::spawn(producer.run());

    // ctrl-c 触发关闭信号
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("收到退出信号，通知消费循环停止");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    // 种子生产是有界任务：失败视为流连接故障，整个运行中止
    producer_task.await??;

    // 消费循环运行到关闭信号或致命错误为止
    consumer_task.await??;

    db.close().await;
    info!("order-ingest-service 已退出");
    Ok(())
}
