//! 店铺平台网关
//!
//! 订单管道的协作面：向第三方店铺平台注册商品更新 webhook、
//! 处理回调的商品更新、完成 OAuth 授权码换取访问令牌。
//! 这些都是简单的 I/O 包装，与订单管道只共享存储契约，
//! 键与表互不重叠。

pub mod api;
pub mod error;
pub mod oauth;
pub mod routes;
pub mod state;
pub mod webhook;
