// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::HashMap;

/// 基于reqwest的HTTP传输实现
///
/// 复用连接池与Cookie存储；重定向在此层禁用，
/// 跳数控制由Fetcher负责。
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 创建新的传输实例
    ///
    /// # 返回值
    ///
    /// * `Ok(ReqwestTransport)` - 传输实例
    /// * `Err(TransportError)` - 客户端构建失败
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build client: {}", e)))?;
        Ok(Self { client })
    }

    fn classify(request: &TransportRequest, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(request.timeout)
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        // Build headers
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        let response = self
            .client
            .get(request.url.clone())
            .header("User-Agent", &request.user_agent)
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(request, e))?;

        let status = response.status().as_u16();

        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(request, e))?;

        Ok(TransportResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}
