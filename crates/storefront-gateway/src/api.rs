//! 店铺平台 API 客户端
//!
//! 封装对店铺平台 Admin API 的出站调用：webhook 注册与商品查询。
//! 所有请求都带静态访问令牌头，非预期状态码连同响应体一起上抛，
//! 便于在日志里直接看到平台侧的报错。

use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::info;

use orderflow_shared::config::StorefrontSettings;

use crate::error::GatewayError;

/// 平台 Admin API 版本号，升级时统一在此调整
const API_VERSION: &str = "2023-01";

/// 访问令牌请求头
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// 店铺平台客户端
#[derive(Clone)]
pub struct StorefrontClient {
    http: reqwest::Client,
    shop_name: String,
    access_token: String,
}

impl StorefrontClient {
    pub fn new(settings: &StorefrontSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            shop_name: settings.shop_name.clone(),
            access_token: settings.access_token.clone(),
        }
    }

    /// 构造 Admin API 的完整 URL
    fn admin_url(&self, path: &str) -> String {
        format!(
            "https://{}.myshopify.com/admin/api/{API_VERSION}/{path}",
            self.shop_name
        )
    }

    /// 注册商品更新 webhook
    ///
    /// 平台以 201 Created 表示注册成功；其余状态码连同响应体上抛。
    pub async fn register_product_update_webhook(
        &self,
        webhook_url: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "webhook": {
                "topic": "products/update",
                "address": webhook_url,
                "format": "json",
            }
        });

        let resp = self
            .http
            .post(self.admin_url("webhooks.json"))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&body)
            .send()
            .await?;

        if resp.status() != StatusCode::CREATED {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Storefront(format!(
                "注册 webhook 失败: {status} {text}"
            )));
        }

        info!(shop = %self.shop_name, webhook_url, "商品更新 webhook 注册成功");
        Ok(())
    }

    /// 查询单个商品详情
    pub async fn fetch_product(&self, product_id: &str) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .get(self.admin_url(&format!("products/{product_id}.json")))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Storefront(format!(
                "查询商品 {product_id} 失败: {}",
                resp.status()
            )));
        }

        let product = resp.json::<Value>().await?;
        info!(product_id, "商品详情已获取");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> StorefrontSettings {
        StorefrontSettings {
            shop_name: "demo-shop".to_string(),
            access_token: "shpat-test".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            webhook_url: "https://example.com/storefront/product/update".to_string(),
        }
    }

    #[test]
    fn test_admin_url_layout() {
        let client = StorefrontClient::new(&test_settings());

        assert_eq!(
            client.admin_url("webhooks.json"),
            "https://demo-shop.myshopify.com/admin/api/2023-01/webhooks.json"
        );
        assert_eq!(
            client.admin_url("products/42.json"),
            "https://demo-shop.myshopify.com/admin/api/2023-01/products/42.json"
        );
    }
}
