// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::host_state::HostRegistry;
use crate::domain::models::task::{CrawlTask, TaskStatus};
use crate::domain::repositories::task_store::TaskStore;
use crate::engines::fetcher::Fetcher;
use crate::engines::traits::HttpTransport;
use crate::engines::user_agent::UserAgentProvider;
use crate::queue::frontier::Frontier;
use crate::utils::errors::WorkerError;
use crate::utils::robots::RobotsCache;
use crate::utils::url_utils;
use crate::workers::crawl_worker::CrawlWorker;
use crate::workers::stats::{CrawlReport, CrawlStats};
use crate::workers::worker::Worker;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 爬取会话
///
/// 组装Frontier、robots缓存、抓取器与工作器池，驱动一次
/// 完整的爬取。会话持有取消信号；工作器在任务之间响应
/// 取消并干净退出，存储不可用等致命错误会取消整个会话。
pub struct CrawlSession<S: TaskStore + 'static> {
    settings: Arc<Settings>,
    frontier: Arc<Frontier>,
    hosts: Arc<HostRegistry>,
    robots: Arc<RobotsCache>,
    fetcher: Arc<Fetcher>,
    store: Arc<S>,
    stats: Arc<CrawlStats>,
    scope_domains: Mutex<Vec<String>>,
    cancel_tx: watch::Sender<bool>,
}

impl<S: TaskStore> CrawlSession<S> {
    /// 创建新的爬取会话
    ///
    /// # 参数
    ///
    /// * `settings` - 应用配置
    /// * `store` - 任务存储协作方
    /// * `transport` - HTTP传输协作方
    pub fn new(settings: Arc<Settings>, store: Arc<S>, transport: Arc<dyn HttpTransport>) -> Self {
        let hosts = Arc::new(HostRegistry::new(
            settings.politeness.per_host_concurrency,
            settings.politeness.default_crawl_delay(),
        ));
        let frontier = Arc::new(Frontier::new(hosts.clone()));
        let robots = Arc::new(RobotsCache::new(
            transport.clone(),
            settings.politeness.robots_ttl(),
            settings.politeness.user_agent.clone(),
        ));
        let user_agents = UserAgentProvider::new(
            settings.politeness.user_agent.clone(),
            settings.politeness.rotate_user_agents,
        );
        let fetcher = Arc::new(Fetcher::new(
            transport,
            hosts.clone(),
            user_agents,
            &settings.fetch,
        ));
        let (cancel_tx, _) = watch::channel(false);

        Self {
            settings,
            frontier,
            hosts,
            robots,
            fetcher,
            store,
            stats: Arc::new(CrawlStats::new()),
            scope_domains: Mutex::new(Vec::new()),
            cancel_tx,
        }
    }

    /// 注入种子URL
    ///
    /// 每个种子经过规范化后入队并持久化；无法解析的种子
    /// 记录警告后跳过。种子域名构成same_domain_only的爬取范围。
    ///
    /// # 返回值
    ///
    /// 实际入队的种子数量
    pub async fn seed(&self, seeds: &[String]) -> Result<usize, WorkerError> {
        let mut accepted = 0;
        for raw in seeds {
            match url_utils::normalize(raw, self.settings.crawler.strict_normalization) {
                Ok(url) => {
                    let domain = url.host().to_string();
                    let mut task =
                        CrawlTask::discovered(url, 0, self.settings.crawler.max_retries);
                    task.enqueue()
                        .map_err(|e| WorkerError::Internal(e.to_string()))?;
                    if self.frontier.push(task.clone()) {
                        self.store.save(&task).await?;
                        let mut scope = self.scope_domains.lock();
                        if !scope.contains(&domain) {
                            scope.push(domain);
                        }
                        accepted += 1;
                    }
                }
                Err(e) => warn!("Skipping malformed seed URL {}: {}", raw, e),
            }
        }
        Ok(accepted)
    }

    /// 从存储恢复上次会话未完成的任务
    ///
    /// 在seed之前调用；恢复的任务回到Queued状态重新排队，
    /// 深度为0的任务域名并入爬取范围。
    ///
    /// # 返回值
    ///
    /// 重新入队的任务数量
    pub async fn resume(&self) -> Result<usize, WorkerError> {
        let pending = self.store.load_pending().await?;
        let mut restored = 0;
        for mut task in pending {
            if task.status != TaskStatus::Queued {
                task.status = TaskStatus::Queued;
            }
            if task.depth == 0 {
                let domain = task.url.host().to_string();
                let mut scope = self.scope_domains.lock();
                if !scope.contains(&domain) {
                    scope.push(domain);
                }
            }
            if self.frontier.push(task) {
                restored += 1;
            }
        }
        if restored > 0 {
            info!("Restored {} pending tasks from store", restored);
        }
        Ok(restored)
    }

    /// 取消会话
    ///
    /// 工作器在当前任务处理完后退出，进行中的抓取
    /// 依靠自身超时结束
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// 运行爬取直到Frontier耗尽或会话被取消
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlReport)` - 会话统计报告
    /// * `Err(WorkerError)` - 会话因致命错误终止
    pub async fn run(&self) -> Result<CrawlReport, WorkerError> {
        let started = std::time::Instant::now();
        let scope = Arc::new(self.scope_domains.lock().clone());
        let worker_count = self.settings.crawler.worker_count.max(1);
        info!("Starting crawl session with {} workers", worker_count);

        let mut handles = Vec::new();
        for id in 0..worker_count {
            let worker = CrawlWorker::new(
                id,
                self.frontier.clone(),
                self.hosts.clone(),
                self.robots.clone(),
                self.fetcher.clone(),
                self.store.clone(),
                self.stats.clone(),
                scope.clone(),
                self.settings.clone(),
                self.cancel_tx.subscribe(),
            );
            let cancel_tx = self.cancel_tx.clone();
            handles.push(tokio::spawn(async move {
                let outcome = worker.run().await;
                if let Err(e) = &outcome {
                    error!("{} failed: {}", worker.name(), e);
                    // 致命错误波及整个会话
                    let _ = cancel_tx.send(true);
                }
                outcome
            }));
        }

        let mut failure: Option<WorkerError> = None;
        for handle in futures::future::join_all(handles).await {
            match handle {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(WorkerError::Internal(format!("worker panicked: {}", e)));
                    }
                }
            }
        }

        let report = self
            .stats
            .snapshot(started.elapsed().as_millis() as u64, self.frontier.len());
        info!(
            "Crawl session completed in {} ms ({} pages fetched, {} failed)",
            report.elapsed_ms, report.pages_fetched, report.pages_failed
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
