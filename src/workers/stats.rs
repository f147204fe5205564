// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话级统计计数
///
/// 计数同时写入进程指标，供Prometheus导出器采集
#[derive(Debug, Default)]
pub struct CrawlStats {
    pages_fetched: AtomicU64,
    pages_failed: AtomicU64,
    robots_denied: AtomicU64,
    retries: AtomicU64,
    links_discovered: AtomicU64,
    images_discovered: AtomicU64,
}

impl CrawlStats {
    /// 创建新的统计实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功抓取
    pub fn record_page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        counter!("pages_fetched_total").increment(1);
    }

    /// 记录一次终态失败
    pub fn record_page_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
        counter!("pages_failed_total").increment(1);
    }

    /// 记录一次robots.txt拒绝
    pub fn record_robots_denied(&self) {
        self.robots_denied.fetch_add(1, Ordering::Relaxed);
        counter!("robots_denied_total").increment(1);
    }

    /// 记录一次重试调度
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        counter!("fetch_retries_total").increment(1);
    }

    /// 记录新发现并入队的链接
    pub fn record_link_discovered(&self) {
        self.links_discovered.fetch_add(1, Ordering::Relaxed);
        counter!("links_discovered_total").increment(1);
    }

    /// 记录发现的图片引用
    pub fn record_images_discovered(&self, count: u64) {
        if count > 0 {
            self.images_discovered.fetch_add(count, Ordering::Relaxed);
            counter!("images_discovered_total").increment(count);
        }
    }

    /// 生成当前计数的快照
    pub fn snapshot(&self, elapsed_ms: u64, pending_remaining: usize) -> CrawlReport {
        CrawlReport {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            robots_denied: self.robots_denied.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            links_discovered: self.links_discovered.load(Ordering::Relaxed),
            images_discovered: self.images_discovered.load(Ordering::Relaxed),
            pending_remaining,
            elapsed_ms,
        }
    }
}

/// 会话结束时的爬取报告
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    /// 成功抓取的页面数
    pub pages_fetched: u64,
    /// 终态失败的页面数
    pub pages_failed: u64,
    /// 被robots.txt拒绝的任务数
    pub robots_denied: u64,
    /// 重试调度次数
    pub retries: u64,
    /// 新发现并入队的链接数
    pub links_discovered: u64,
    /// 发现的图片引用数
    pub images_discovered: u64,
    /// 会话结束时仍在排队的任务数（取消时非零）
    pub pending_remaining: usize,
    /// 会话耗时（毫秒）
    pub elapsed_ms: u64,
}
