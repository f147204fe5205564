// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{HttpTransport, TransportRequest};
use crate::utils::retry_policy::RetryPolicy;
use dashmap::DashMap;
use metrics::counter;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// robots.txt抓取的单次请求超时
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// 缓存的robots.txt规则
///
/// 保留原始内容，匹配时按需解析；空内容等价于全部允许。
/// degraded表示规则来源不可用而回退为全部允许。
#[derive(Debug, Clone)]
struct CachedRobots {
    content: String,
    crawl_delay: Option<Duration>,
    degraded: bool,
    expires_at: Instant,
}

/// robots.txt策略缓存
///
/// 以主机为键缓存规则，TTL过期后重新抓取。对同一未缓存主机的
/// 并发查询通过每主机的异步锁合并为一次抓取。抓取失败时
/// 回退为全部允许（fail-open）并记录降级事件，避免爬取停滞。
pub struct RobotsCache {
    transport: Arc<dyn HttpTransport>,
    cache: DashMap<String, Arc<CachedRobots>>,
    fetch_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    ttl: Duration,
    user_agent: String,
    retry_policy: RetryPolicy,
}

impl RobotsCache {
    /// 创建新的robots.txt策略缓存
    ///
    /// # 参数
    ///
    /// * `transport` - HTTP传输实现
    /// * `ttl` - 规则缓存TTL
    /// * `user_agent` - 用于规则匹配的爬虫身份
    pub fn new(transport: Arc<dyn HttpTransport>, ttl: Duration, user_agent: String) -> Self {
        Self {
            transport,
            cache: DashMap::new(),
            fetch_locks: DashMap::new(),
            ttl,
            user_agent,
            retry_policy: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(5),
                ..Default::default()
            },
        }
    }

    /// 检查URL是否被允许访问
    ///
    /// # 参数
    ///
    /// * `url` - 待检查的URL，主机名从中提取
    ///
    /// # 返回值
    ///
    /// 允许返回true；规则不可用时按fail-open返回true
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let rules = self.rules_for(url.scheme(), host).await;
        if rules.degraded || rules.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&rules.content, &self.user_agent, url.as_str())
    }

    /// 获取主机的crawl-delay
    ///
    /// # 返回值
    ///
    /// robots.txt为该爬虫声明的延迟，未声明或规则降级时为None
    pub async fn crawl_delay(&self, scheme: &str, host: &str) -> Option<Duration> {
        self.rules_for(scheme, host).await.crawl_delay
    }

    /// 获取主机的规则，缓存未命中或过期时同步抓取
    async fn rules_for(&self, scheme: &str, host: &str) -> Arc<CachedRobots> {
        let key = format!("{}://{}", scheme, host);

        if let Some(cached) = self.cache.get(&key) {
            if cached.expires_at > Instant::now() {
                return cached.clone();
            }
        }

        // Coalesce concurrent fetches for the same host
        let lock = self
            .fetch_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed the entry while we waited
        if let Some(cached) = self.cache.get(&key) {
            if cached.expires_at > Instant::now() {
                return cached.clone();
            }
        }

        let fetched = Arc::new(self.fetch_robots(scheme, host).await);
        self.cache.insert(key, fetched.clone());
        fetched
    }

    fn entry(&self, content: String, crawl_delay: Option<Duration>, degraded: bool) -> CachedRobots {
        CachedRobots {
            content,
            crawl_delay,
            degraded,
            expires_at: Instant::now() + self.ttl,
        }
    }

    /// 抓取并解析robots.txt
    async fn fetch_robots(&self, scheme: &str, host: &str) -> CachedRobots {
        let robots_url = format!("{}://{}/robots.txt", scheme, host);
        let url = match Url::parse(&robots_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid robots.txt URL {}: {}", robots_url, e);
                return self.degraded_entry(&robots_url);
            }
        };

        let request = TransportRequest {
            url,
            user_agent: self.user_agent.clone(),
            headers: Vec::new(),
            timeout: ROBOTS_FETCH_TIMEOUT,
        };

        let mut retries = 0u32;
        let mut last_error = String::new();

        loop {
            match self.transport.send(&request).await {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    let content = resp.text_lossy();
                    let crawl_delay = parse_crawl_delay(&content, &self.user_agent);
                    debug!(
                        "Fetched robots.txt for {} ({} bytes, crawl-delay {:?})",
                        host,
                        content.len(),
                        crawl_delay
                    );
                    return self.entry(content, crawl_delay, false);
                }
                Ok(resp) if resp.status == 404 => {
                    // 404 is a valid response, meaning no robots.txt
                    return self.entry(String::new(), None, false);
                }
                Ok(resp) if (500..600).contains(&resp.status) => {
                    last_error = format!("server error: {}", resp.status);
                }
                Ok(resp) => {
                    // Other statuses (401, 403, ...) fail open without retrying
                    last_error = format!("unexpected status: {}", resp.status);
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if !self.retry_policy.should_retry(retries) {
                break;
            }
            retries += 1;
            tokio::time::sleep(self.retry_policy.calculate_backoff(retries)).await;
        }

        warn!(
            "Failed to fetch robots.txt from {} ({}); failing open",
            robots_url, last_error
        );
        self.degraded_entry(&robots_url)
    }

    fn degraded_entry(&self, robots_url: &str) -> CachedRobots {
        counter!("robots_degraded_total").increment(1);
        debug!("Degraded robots policy in effect for {}", robots_url);
        self.entry(String::new(), None, true)
    }
}

/// 解析Crawl-delay指令
///
/// 扫描User-agent块，匹配爬虫自身的块优先于通配块；
/// 无法解析的数值按未声明处理。
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<Duration> {
    let mut current_agent_matched = false;
    let mut specific_agent_found = false;
    let mut delay: Option<f64> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let lower_line = line.to_lowercase();
        if let Some(agent) = lower_line.strip_prefix("user-agent:") {
            let agent = agent.trim();
            if agent == "*" {
                current_agent_matched = !specific_agent_found;
            } else if user_agent.to_lowercase().contains(agent) {
                current_agent_matched = true;
                // A specific agent block overrides anything taken from "*"
                if !specific_agent_found {
                    specific_agent_found = true;
                    delay = None;
                }
            } else {
                current_agent_matched = false;
            }
        } else if current_agent_matched {
            if let Some(value) = lower_line.strip_prefix("crawl-delay:") {
                if let Ok(secs) = value.trim().parse::<f64>() {
                    if secs >= 0.0 {
                        delay = Some(secs);
                    }
                }
            }
        }
    }

    delay.map(Duration::from_secs_f64)
}
