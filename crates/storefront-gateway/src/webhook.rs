//! 商品更新 webhook 处理
//!
//! 平台回调的商品更新被 upsert 到缓存（product:{id}，永不过期）
//! 和持久存储的 products 表。与订单管道共享存储契约，键与表不重叠。

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use orderflow_shared::cache::CacheKey;

use crate::error::GatewayError;
use crate::state::AppState;

/// 从商品更新负载中提取商品 ID
///
/// 平台负载的 id 是数字；容忍字符串形式，便于手工重放。
pub fn extract_product_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// 商品更新 webhook 处理器
///
/// POST /storefront/product/update
pub async fn handle_product_update(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    metrics::counter!("webhook_requests_total").increment(1);

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidWebhookPayload(format!("负载不是合法 JSON: {e}")))?;

    let product_id = extract_product_id(&payload)
        .ok_or_else(|| GatewayError::InvalidWebhookPayload("负载缺少商品 id".to_string()))?;

    info!(product_id, "收到商品更新 webhook");

    // 先缓存后持久，与订单状态的写入次序保持一致
    state
        .cache
        .set(&CacheKey::product(&product_id), &payload, Duration::ZERO)
        .await
        .map_err(GatewayError::Shared)?;

    sqlx::query(
        r#"
        INSERT INTO products (product_id, data, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (product_id)
        DO UPDATE SET data = EXCLUDED.data, updated_at = now()
        "#,
    )
    .bind(&product_id)
    .bind(&payload)
    .execute(&state.pool)
    .await
    .map_err(|e| GatewayError::Shared(e.into()))?;

    info!(product_id, "商品记录已更新到缓存与持久存储");
    Ok(StatusCode::OK)
}
