// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含爬取会话、礼貌性控制、抓取与指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 爬取会话配置
    pub crawler: CrawlerSettings,
    /// 礼貌性控制配置
    pub politeness: PolitenessSettings,
    /// 抓取配置
    pub fetch: FetchSettings,
    /// Frontier配置
    pub frontier: FrontierSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 爬取会话配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSettings {
    /// 种子URL列表
    pub seeds: Vec<String>,
    /// 并行抓取工作器数量
    pub worker_count: usize,
    /// 最大爬取深度，种子为0
    pub max_depth: u32,
    /// 单任务最大重试次数
    pub max_retries: u32,
    /// 是否只爬取种子所在域名（含www与子域名）
    pub same_domain_only: bool,
    /// URL规范化是否启用严格模式（查询参数排序）
    pub strict_normalization: bool,
}

/// 礼貌性控制配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessSettings {
    /// 每主机并发上限
    pub per_host_concurrency: usize,
    /// robots.txt未提供crawl-delay时的默认延迟（毫秒）
    pub default_crawl_delay_ms: u64,
    /// robots.txt缓存TTL（秒）
    pub robots_ttl_secs: u64,
    /// 爬虫身份User-Agent，用于robots.txt匹配
    pub user_agent: String,
    /// 抓取请求是否轮换浏览器User-Agent
    pub rotate_user_agents: bool,
}

/// 抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    /// 单次抓取超时时间（秒）
    pub timeout_secs: u64,
    /// 重定向跳数上限
    pub redirect_limit: u32,
    /// 初始退避时间（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避时间（毫秒）
    pub max_backoff_ms: u64,
}

/// Frontier配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierSettings {
    /// 无可调度主机时pop的等待超时（毫秒）
    pub pop_timeout_ms: u64,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启动Prometheus导出器
    pub enabled: bool,
    /// 导出器监听地址
    pub listen_addr: String,
}

impl PolitenessSettings {
    /// 默认crawl-delay
    pub fn default_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.default_crawl_delay_ms)
    }

    /// robots.txt缓存TTL
    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }
}

impl FetchSettings {
    /// 单次抓取超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FrontierSettings {
    /// pop等待超时
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、可选配置文件与环境变量加载配置
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default crawler settings
            .set_default("crawler.seeds", Vec::<String>::new())?
            .set_default("crawler.worker_count", 5)?
            .set_default("crawler.max_depth", 3)?
            .set_default("crawler.max_retries", 3)?
            .set_default("crawler.same_domain_only", true)?
            .set_default("crawler.strict_normalization", false)?
            // Default politeness settings
            .set_default("politeness.per_host_concurrency", 2)?
            .set_default("politeness.default_crawl_delay_ms", 500)?
            .set_default("politeness.robots_ttl_secs", 86400)?
            .set_default(
                "politeness.user_agent",
                "crawlcore-bot/1.0 (+https://crawlcore.dev)",
            )?
            .set_default("politeness.rotate_user_agents", false)?
            // Default fetch settings
            .set_default("fetch.timeout_secs", 30)?
            .set_default("fetch.redirect_limit", 5)?
            .set_default("fetch.initial_backoff_ms", 500)?
            .set_default("fetch.max_backoff_ms", 30_000)?
            // Default frontier settings
            .set_default("frontier.pop_timeout_ms", 1_000)?
            // Default metrics settings
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CRAWLCORE").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::new().unwrap();

        assert_eq!(settings.crawler.worker_count, 5);
        assert_eq!(settings.crawler.max_retries, 3);
        assert!(settings.crawler.same_domain_only);
        assert_eq!(settings.politeness.per_host_concurrency, 2);
        assert_eq!(settings.politeness.robots_ttl(), Duration::from_secs(86400));
        assert_eq!(settings.fetch.timeout(), Duration::from_secs(30));
        assert_eq!(settings.fetch.redirect_limit, 5);
        assert_eq!(settings.frontier.pop_timeout(), Duration::from_millis(1_000));
        assert!(!settings.metrics.enabled);
    }
}
