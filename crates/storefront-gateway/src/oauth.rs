//! OAuth 授权流程
//!
//! 提供授权 URL 构造与回调处理：平台带着 code/shop 参数回跳，
//! 网关用授权码向平台令牌端点换取访问令牌。令牌仅记录日志用于
//! 人工接入流程，不落任何存储。

use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::state::AppState;

/// 平台要求的授权范围
const OAUTH_SCOPES: &str = "read_products,write_products";

/// 构造平台授权页 URL
pub fn authorize_url(api_key: &str, shop_name: &str, redirect_uri: &str) -> String {
    let redirect = urlencode(redirect_uri);
    format!(
        "https://{shop_name}.myshopify.com/admin/oauth/authorize?client_id={api_key}&scope={OAUTH_SCOPES}&redirect_uri={redirect}"
    )
}

/// 最小化的百分号编码，覆盖回调 URL 中会出现的保留字符
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// OAuth 回调的查询参数
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub shop: Option<String>,
}

/// 平台令牌端点的响应
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth 回调处理器
///
/// GET /storefront/oauth/callback?code=...&shop=...
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<String, GatewayError> {
    let (code, shop) = match (query.code, query.shop) {
        (Some(code), Some(shop)) if !code.is_empty() && !shop.is_empty() => (code, shop),
        _ => {
            warn!("OAuth 回调缺少 code 或 shop 参数");
            return Err(GatewayError::InvalidCallback(
                "缺少 code 或 shop 参数".to_string(),
            ));
        }
    };

    let token = exchange_code_for_token(
        &state.http,
        &shop,
        &code,
        &state.settings.api_key,
        &state.settings.api_secret,
    )
    .await?;

    // 令牌本身不进日志，只记录长度与授权范围
    info!(
        shop,
        scope = token.scope.as_deref().unwrap_or(""),
        token_len = token.access_token.len(),
        "店铺授权成功"
    );

    Ok(format!("Shop {shop} authenticated"))
}

/// 用授权码向平台令牌端点换取访问令牌
async fn exchange_code_for_token(
    http: &reqwest::Client,
    shop: &str,
    code: &str,
    api_key: &str,
    api_secret: &str,
) -> Result<AccessTokenResponse, GatewayError> {
    let token_url = format!("https://{shop}.myshopify.com/admin/oauth/access_token");
    let params = [
        ("client_id", api_key),
        ("client_secret", api_secret),
        ("code", code),
    ];

    let resp = http.post(token_url).form(&params).send().await?;

    if !resp.status().is_success() {
        return Err(GatewayError::TokenExchange(format!(
            "令牌端点返回 {}",
            resp.status()
        )));
    }

    resp.json::<AccessTokenResponse>()
        .await
        .map_err(|e| GatewayError::TokenExchange(format!("解析令牌响应失败: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_layout() {
        let url = authorize_url("my-key", "demo-shop", "https://app.example.com/cb");

        assert!(url.starts_with("https://demo-shop.myshopify.com/admin/oauth/authorize?"));
        assert!(url.contains("client_id=my-key"));
        assert!(url.contains("scope=read_products,write_products"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"));
    }

    #[test]
    fn test_urlencode_keeps_unreserved() {
        assert_eq!(urlencode("abc-123_.~"), "abc-123_.~");
        assert_eq!(urlencode("a b"), "a%20b");
    }

    #[test]
    fn test_token_response_parsing() {
        let json = r#"{"access_token":"shpat-abc","scope":"read_products"}"#;
        let parsed: AccessTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "shpat-abc");
        assert_eq!(parsed.scope.as_deref(), Some("read_products"));
    }
}
