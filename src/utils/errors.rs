// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 爬取错误类型
///
/// 抓取过程中所有失败情况的统一分类。Fetcher和Frontier不向上
/// 传播原始传输错误，而是先归入此分类，再据此更新任务状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// URL格式错误，在规范化阶段被丢弃，不可重试
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// 网络错误（超时、连接失败、DNS解析失败），可重试
    #[error("Network error: {0}")]
    Network(String),

    /// 客户端错误（4xx），不可重试
    #[error("Client error: status {0}")]
    Client(u16),

    /// 服务端错误（5xx），可重试
    #[error("Server error: status {0}")]
    Server(u16),

    /// 被robots.txt规则拒绝，任务静默丢弃但计入指标
    #[error("Denied by robots.txt: {0}")]
    RobotsDenied(String),

    /// 重定向次数超过上限，视为终态客户端错误
    #[error("Too many redirects: {0}")]
    TooManyRedirects(String),
}

impl CrawlError {
    /// 判断错误是否可重试
    ///
    /// 网络错误与服务端错误进入退避重试流程，其余均为终态
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Network(_) | CrawlError::Server(_))
    }
}

/// Frontier错误类型
///
/// 去重集合与各主机队列不一致属于会话级致命错误，
/// 单个任务的失败不会产生此类错误。
#[derive(Error, Debug)]
pub enum FrontierError {
    /// 去重集合损坏，会话必须终止
    #[error("Frontier dedup set corrupted: {0}")]
    Corrupted(String),
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    /// 存储错误，对整个会话致命
    #[error("Store error: {0}")]
    Store(#[from] crate::domain::repositories::task_store::RepositoryError),

    /// Frontier错误
    #[error("Frontier error: {0}")]
    Frontier(#[from] FrontierError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}
