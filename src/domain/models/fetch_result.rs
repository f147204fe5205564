// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::CrawlError;
use crate::utils::url_utils::CanonicalUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 抓取结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// 2xx响应
    Success,
    /// 无法继续跟随的重定向（缺少Location或重定向到非http协议）
    Redirect,
    /// 4xx响应或重定向超限，不可重试
    ClientError,
    /// 5xx响应，可重试
    ServerError,
    /// 传输层失败（超时、连接错误、DNS失败），可重试
    NetworkError,
}

impl StatusKind {
    /// 根据HTTP状态码分类
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => StatusKind::Success,
            300..=399 => StatusKind::Redirect,
            400..=499 => StatusKind::ClientError,
            _ => StatusKind::ServerError,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatusKind::Success => write!(f, "success"),
            StatusKind::Redirect => write!(f, "redirect"),
            StatusKind::ClientError => write!(f, "client_error"),
            StatusKind::ServerError => write!(f, "server_error"),
            StatusKind::NetworkError => write!(f, "network_error"),
        }
    }
}

/// 抓取结果
///
/// 每次完成的抓取尝试产生一个结果，供链接提取器消费后
/// 交存储协作方持久化。body仅在内容为HTML时保留，
/// 二进制内容的分类由解码协作方负责，不在本核心范围内。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// 任务的规范化URL
    pub url: CanonicalUrl,
    /// 结果分类
    pub status_kind: StatusKind,
    /// HTTP状态码，传输层失败时为None
    pub status_code: Option<u16>,
    /// 响应体，仅HTML内容保留
    pub body: Option<String>,
    /// Content-Type响应头
    pub content_type: Option<String>,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 抓取完成时间
    pub fetched_at: DateTime<Utc>,
    /// 失败详情（如 "too many redirects"）
    pub detail: Option<String>,
    /// 响应耗时（毫秒）
    pub response_time_ms: u64,
}

impl FetchResult {
    /// 判断结果内容是否为HTML
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false)
    }

    /// 判断本次失败是否可重试
    ///
    /// 服务端错误与网络错误可重试；429虽属4xx，
    /// 但语义上是限流信号，同样进入退避重试
    pub fn is_retryable(&self) -> bool {
        match self.status_kind {
            StatusKind::ServerError | StatusKind::NetworkError => true,
            StatusKind::ClientError => self.status_code == Some(429),
            _ => false,
        }
    }

    /// 将失败结果映射到统一错误分类
    ///
    /// # 返回值
    ///
    /// 成功结果为None，其余按状态归入[`CrawlError`]
    pub fn as_error(&self) -> Option<CrawlError> {
        match self.status_kind {
            StatusKind::Success => None,
            StatusKind::NetworkError => Some(CrawlError::Network(
                self.detail
                    .clone()
                    .unwrap_or_else(|| "network failure".to_string()),
            )),
            StatusKind::ServerError => Some(CrawlError::Server(self.status_code.unwrap_or(500))),
            StatusKind::ClientError => match self.status_code {
                Some(code) => Some(CrawlError::Client(code)),
                // 没有状态码的客户端错误只产生于重定向超限
                None => Some(CrawlError::TooManyRedirects(self.url.as_str().to_string())),
            },
            StatusKind::Redirect => Some(CrawlError::Client(self.status_code.unwrap_or(300))),
        }
    }
}
