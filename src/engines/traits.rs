// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// 传输层错误类型
///
/// 所有变体对上层统一表现为网络错误，分类与重试由Fetcher负责
#[derive(Error, Debug)]
pub enum TransportError {
    /// 请求超时
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// 连接失败（拒绝连接、DNS解析失败等）
    #[error("Connection failed: {0}")]
    Connect(String),

    /// 其他传输失败
    #[error("Transport failure: {0}")]
    Other(String),
}

/// 传输请求
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// 目标URL
    pub url: Url,
    /// User-Agent请求头
    pub user_agent: String,
    /// 额外请求头
    pub headers: Vec<(String, String)>,
    /// 单次请求超时
    pub timeout: Duration,
}

/// 传输响应
///
/// 响应体以原始字节保留，是否按文本解读由调用方决定
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP状态码
    pub status: u16,
    /// 响应头，键为小写
    pub headers: HashMap<String, String>,
    /// 原始响应体
    pub body: Bytes,
}

impl TransportResponse {
    /// 获取Content-Type响应头
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// 获取Location响应头
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").map(String::as_str)
    }

    /// 将响应体按UTF-8有损解码为文本
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP传输接口
///
/// 连接池与TLS由实现负责。传输层不跟随重定向，
/// 跳数控制在Fetcher中实现。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 发送请求并读取完整响应
    ///
    /// # 参数
    ///
    /// * `request` - 传输请求
    ///
    /// # 返回值
    ///
    /// * `Ok(TransportResponse)` - 收到的响应（含非2xx状态）
    /// * `Err(TransportError)` - 传输层失败
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}
