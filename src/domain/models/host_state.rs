// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 单个主机的礼貌性状态
///
/// 记录最近一次抓取时间、生效的crawl-delay以及在途请求数。
/// 所有变更都在主机自身的锁内完成，不同主机之间互不阻塞。
#[derive(Debug)]
pub struct HostState {
    host: String,
    inner: Mutex<HostStateInner>,
}

#[derive(Debug)]
struct HostStateInner {
    last_fetch_time: Option<Instant>,
    crawl_delay: Duration,
    in_flight: usize,
}

impl HostState {
    fn new(host: String, default_delay: Duration) -> Self {
        Self {
            host,
            inner: Mutex::new(HostStateInner {
                last_fetch_time: None,
                crawl_delay: default_delay,
                in_flight: 0,
            }),
        }
    }

    /// 获取主机名
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 获取当前生效的crawl-delay
    pub fn crawl_delay(&self) -> Duration {
        self.inner.lock().crawl_delay
    }

    /// 设置crawl-delay
    ///
    /// 由robots.txt查询结果或配置的默认延迟决定
    pub fn set_crawl_delay(&self, delay: Duration) {
        self.inner.lock().crawl_delay = delay;
    }

    /// 获取在途请求数
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// 计算主机下次可抓取的时间
    ///
    /// # 参数
    ///
    /// * `now` - 当前时间
    /// * `limit` - 每主机并发上限
    ///
    /// # 返回值
    ///
    /// * `Some(Instant)` - 礼貌窗口到期的时间，可能已是过去
    /// * `None` - 在途请求已达上限，需等待释放
    pub fn next_eligible(&self, now: Instant, limit: usize) -> Option<Instant> {
        let inner = self.inner.lock();
        if inner.in_flight >= limit {
            return None;
        }
        match inner.last_fetch_time {
            Some(last) => Some((last + inner.crawl_delay).max(now)),
            None => Some(now),
        }
    }

    /// 尝试占用一个抓取槽位
    ///
    /// 在主机锁内复核礼貌窗口与并发上限，成功时递增在途计数
    /// 并记录本次抓取的开始时间，保证同主机两次抓取的开始
    /// 间隔不小于crawl-delay。
    ///
    /// # 返回值
    ///
    /// 占用成功返回true，上限已满或窗口未到返回false
    pub fn try_acquire(&self, now: Instant, limit: usize) -> bool {
        let mut inner = self.inner.lock();
        if inner.in_flight >= limit {
            return false;
        }
        if let Some(last) = inner.last_fetch_time {
            if now < last + inner.crawl_delay {
                return false;
            }
        }
        inner.in_flight += 1;
        inner.last_fetch_time = Some(now);
        true
    }

    /// 释放抓取槽位
    ///
    /// # 参数
    ///
    /// * `now` - 当前时间
    /// * `stamp` - 是否刷新last_fetch_time；抓取完成时为true，
    ///   未实际发起抓取（如被robots拒绝）时为false
    pub fn release(&self, now: Instant, stamp: bool) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if stamp {
            inner.last_fetch_time = Some(now);
        }
    }
}

/// 主机状态注册表
///
/// 以主机名为键的并发映射，按需创建HostState并在会话
/// 生命周期内保留。
pub struct HostRegistry {
    hosts: DashMap<String, Arc<HostState>>,
    per_host_limit: usize,
    default_delay: Duration,
}

impl HostRegistry {
    /// 创建新的主机状态注册表
    ///
    /// # 参数
    ///
    /// * `per_host_limit` - 每主机并发上限
    /// * `default_delay` - robots.txt未提供crawl-delay时的默认延迟
    pub fn new(per_host_limit: usize, default_delay: Duration) -> Self {
        Self {
            hosts: DashMap::new(),
            per_host_limit: per_host_limit.max(1),
            default_delay,
        }
    }

    /// 获取主机状态，不存在时创建
    pub fn host(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new(host.to_string(), self.default_delay)))
            .clone()
    }

    /// 每主机并发上限
    pub fn per_host_limit(&self) -> usize {
        self.per_host_limit
    }

    /// 释放指定主机的抓取槽位
    pub fn release(&self, host: &str, stamp: bool) {
        self.host(host).release(Instant::now(), stamp);
    }
}
