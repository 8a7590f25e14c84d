//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和常用缓存操作封装。订单管道把它同时用作
//! 读穿式幂等检查（状态键）和分布式互斥原语（锁键），两者都建立在
//! `set_nx` 的原子性之上。

use crate::config::RedisConfig;
use crate::error::{PipelineError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{info, instrument};

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(PipelineError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(PipelineError::from)
    }

    /// 获取值
    ///
    /// 键不存在返回 `Ok(None)`，与其他读取错误区分开——
    /// 幂等检查依赖这一区别判断"未处理"与"缓存故障"。
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => {
                let parsed: T = serde_json::from_str(&v).map_err(|e| {
                    PipelineError::Internal(format!("Cache deserialization error: {e}"))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// 设置值
    ///
    /// TTL 为零表示永不过期（状态条目），非零表示定时过期（锁条目）。
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)
            .map_err(|e| PipelineError::Internal(format!("Cache serialization error: {e}")))?;

        if ttl.is_zero() {
            let _: () = conn.set(key, serialized).await?;
        } else {
            let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        }
        Ok(())
    }

    /// 删除值
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// 检查键是否存在
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// 原子性地仅在 key 不存在时设置值，并指定 TTL
    ///
    /// 基于 Redis SET NX EX 实现，适用于分布式幂等检查和互斥控制。
    /// 返回 true 表示设置成功（key 不存在），false 表示 key 已存在。
    pub async fn set_nx<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)
            .map_err(|e| PipelineError::Internal(format!("Cache serialization error: {e}")))?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(serialized)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }
}

/// 缓存键生成器
///
/// 订单管道与网关共用同一个 Redis 实例，键前缀互不重叠。
pub struct CacheKey;

impl CacheKey {
    /// 订单处理状态（幂等标记），永不过期
    pub fn order_status(order_id: &str) -> String {
        format!("order:status:{order_id}")
    }

    /// 单订单处理锁，TTL 兜底释放
    pub fn order_lock(order_id: &str) -> String {
        format!("order:lock:{order_id}")
    }

    /// 店铺商品记录
    pub fn product(product_id: &str) -> String {
        format!("product:{product_id}")
    }
}
