//! 网关错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use orderflow_shared::error::PipelineError;

/// 网关错误类型
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// OAuth 回调缺少 code/shop 参数
    #[error("无效的 OAuth 回调参数: {0}")]
    InvalidCallback(String),

    /// webhook 负载不是合法的商品更新
    #[error("无效的 webhook 负载: {0}")]
    InvalidWebhookPayload(String),

    /// 店铺平台返回非预期状态码
    #[error("店铺平台请求失败: {0}")]
    Storefront(String),

    /// 访问令牌交换失败
    #[error("令牌交换失败: {0}")]
    TokenExchange(String),

    /// 出站 HTTP 请求本身失败
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Shared(#[from] PipelineError),
}

impl GatewayError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCallback(_) | Self::InvalidWebhookPayload(_) => StatusCode::BAD_REQUEST,
            Self::Storefront(_) | Self::TokenExchange(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Shared(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCallback(_) => "INVALID_CALLBACK",
            Self::InvalidWebhookPayload(_) => "INVALID_WEBHOOK_PAYLOAD",
            Self::Storefront(_) => "STOREFRONT_ERROR",
            Self::TokenExchange(_) => "TOKEN_EXCHANGE_FAILED",
            Self::Http(_) => "HTTP_ERROR",
            Self::Shared(e) => e.code(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
