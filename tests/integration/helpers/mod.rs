// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crawlcore::config::settings::{
    CrawlerSettings, FetchSettings, FrontierSettings, MetricsSettings, PolitenessSettings,
    Settings,
};
use crawlcore::domain::repositories::task_store::MemoryTaskStore;
use crawlcore::engines::reqwest_transport::ReqwestTransport;
use crawlcore::workers::manager::CrawlSession;
use std::sync::Arc;

/// 集成测试用的配置：短退避、短pop超时，指标关闭
pub fn test_settings(worker_count: usize) -> Settings {
    Settings {
        crawler: CrawlerSettings {
            seeds: Vec::new(),
            worker_count,
            max_depth: 3,
            max_retries: 3,
            same_domain_only: true,
            strict_normalization: false,
        },
        politeness: PolitenessSettings {
            per_host_concurrency: 2,
            default_crawl_delay_ms: 0,
            robots_ttl_secs: 86400,
            user_agent: "crawlcore-bot/1.0".to_string(),
            rotate_user_agents: false,
        },
        fetch: FetchSettings {
            timeout_secs: 5,
            redirect_limit: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        },
        frontier: FrontierSettings { pop_timeout_ms: 200 },
        metrics: MetricsSettings {
            enabled: false,
            listen_addr: "0.0.0.0:9000".to_string(),
        },
    }
}

/// 构建使用内存存储与真实HTTP传输的测试会话
pub fn test_session(
    settings: Settings,
) -> (Arc<CrawlSession<MemoryTaskStore>>, Arc<MemoryTaskStore>) {
    let store = Arc::new(MemoryTaskStore::new());
    let transport = Arc::new(ReqwestTransport::new().expect("failed to build transport"));
    let session = Arc::new(CrawlSession::new(
        Arc::new(settings),
        store.clone(),
        transport,
    ));
    (session, store)
}
