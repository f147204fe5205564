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

use crate::config::settings::Settings;
use crate::domain::models::fetch_result::{FetchResult, StatusKind};
use crate::domain::models::host_state::HostRegistry;
use crate::domain::models::task::CrawlTask;
use crate::domain::repositories::task_store::TaskStore;
use crate::domain::services::extractor::LinkExtractor;
use crate::engines::fetcher::Fetcher;
use crate::queue::frontier::Frontier;
use crate::utils::errors::{CrawlError, WorkerError};
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::robots::RobotsCache;
use crate::utils::url_utils;
use crate::workers::stats::CrawlStats;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// 爬取工作器
///
/// 从共享Frontier拉取任务：查询robots策略、抓取、提取链接
/// 并把新发现的URL送回Frontier。取消信号在任务之间检查，
/// 进行中的抓取依靠自身的超时结束。
pub struct CrawlWorker<S: TaskStore> {
    name: String,
    frontier: Arc<Frontier>,
    hosts: Arc<HostRegistry>,
    robots: Arc<RobotsCache>,
    fetcher: Arc<Fetcher>,
    extractor: LinkExtractor,
    store: Arc<S>,
    stats: Arc<CrawlStats>,
    retry_policy: RetryPolicy,
    scope_domains: Arc<Vec<String>>,
    settings: Arc<Settings>,
    cancel: watch::Receiver<bool>,
}

impl<S: TaskStore> CrawlWorker<S> {
    /// 创建新的爬取工作器实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        frontier: Arc<Frontier>,
        hosts: Arc<HostRegistry>,
        robots: Arc<RobotsCache>,
        fetcher: Arc<Fetcher>,
        store: Arc<S>,
        stats: Arc<CrawlStats>,
        scope_domains: Arc<Vec<String>>,
        settings: Arc<Settings>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name: format!("crawl-worker-{}", id),
            frontier,
            hosts,
            robots,
            fetcher,
            extractor: LinkExtractor::new(settings.crawler.strict_normalization),
            store,
            stats,
            retry_policy: RetryPolicy {
                max_retries: settings.crawler.max_retries,
                initial_backoff: std::time::Duration::from_millis(settings.fetch.initial_backoff_ms),
                max_backoff: std::time::Duration::from_millis(settings.fetch.max_backoff_ms),
                ..Default::default()
            },
            scope_domains,
            settings,
            cancel,
        }
    }

    #[instrument(skip(self, task), fields(url = %task.url, depth = task.depth, attempt = task.attempt_count))]
    async fn process_task(&self, mut task: CrawlTask) -> Result<(), WorkerError> {
        let host = task.url.host().to_string();

        if let Err(e) = task.begin_fetch() {
            // Frontier只交出Queued状态的任务，到这里属于内部不一致
            self.hosts.release(&host, false);
            self.frontier.task_done();
            return Err(WorkerError::Internal(e.to_string()));
        }
        self.store.save(&task).await?;

        // Robots policy check happens after scheduling, right before the fetch
        if !self.robots.is_allowed(task.url.as_url()).await {
            debug!("Blocked by robots.txt");
            self.stats.record_robots_denied();
            self.hosts.release(&host, false);
            let denied = CrawlError::RobotsDenied(task.url.as_url().path().to_string());
            task.fail(denied.to_string())
                .map_err(|e| WorkerError::Internal(e.to_string()))?;
            self.store.save(&task).await?;
            self.frontier.task_done();
            return Ok(());
        }

        // Effective delay for future scheduling of this host
        if let Some(delay) = self.robots.crawl_delay(task.url.as_url().scheme(), &host).await {
            self.hosts.host(&host).set_crawl_delay(delay);
        }

        let result = self.fetcher.fetch(&task).await;
        self.store.save_result(&result).await?;

        if result.status_kind == StatusKind::Success {
            self.expand_links(&task, &result).await?;
            task.succeed()
                .map_err(|e| WorkerError::Internal(e.to_string()))?;
            self.store.save(&task).await?;
            self.stats.record_page_fetched();
        } else if result.is_retryable() && task.can_retry() {
            let retry = task.attempt_count + 1;
            let backoff = self.retry_policy.calculate_backoff(retry);
            let not_before =
                Utc::now() + chrono::Duration::milliseconds(backoff.as_millis() as i64);
            task.schedule_retry(not_before)
                .map_err(|e| WorkerError::Internal(e.to_string()))?;
            self.store.save(&task).await?;
            self.stats.record_retry();
            debug!(
                "Scheduled retry {}/{} in {:?}",
                task.attempt_count, task.max_retries, backoff
            );
            self.frontier.requeue(task, backoff)?;
        } else {
            let reason = failure_reason(&result);
            warn!("Task failed terminally: {}", reason);
            task.fail(reason)
                .map_err(|e| WorkerError::Internal(e.to_string()))?;
            self.store.save(&task).await?;
            self.stats.record_page_failed();
        }

        self.frontier.task_done();
        Ok(())
    }

    /// 提取页面中的链接与图片引用，把范围内的新链接送入Frontier
    async fn expand_links(&self, task: &CrawlTask, result: &FetchResult) -> Result<(), WorkerError> {
        let images = self.extractor.extract_images(result);
        self.stats.record_images_discovered(images.len() as u64);

        if task.depth >= self.settings.crawler.max_depth {
            debug!("Depth limit reached, not expanding links");
            return Ok(());
        }

        for link in self.extractor.extract(result) {
            if self.settings.crawler.same_domain_only
                && !self
                    .scope_domains
                    .iter()
                    .any(|domain| url_utils::is_same_domain(link.as_url(), domain))
            {
                continue;
            }

            let mut child = CrawlTask::discovered(
                link,
                task.depth + 1,
                self.settings.crawler.max_retries,
            );
            if child.enqueue().is_err() {
                continue;
            }
            if self.frontier.push(child.clone()) {
                self.store.save(&child).await?;
                self.stats.record_link_discovered();
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<S: TaskStore> Worker for CrawlWorker<S> {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("{} started", self.name);
        let pop_timeout = self.settings.frontier.pop_timeout();

        loop {
            if *self.cancel.borrow() {
                info!("{} exiting on cancellation", self.name);
                break;
            }

            match self.frontier.pop(pop_timeout).await {
                Some(task) => self.process_task(task).await?,
                None => {
                    if self.frontier.is_idle() {
                        info!("{} exiting, frontier drained", self.name);
                        break;
                    }
                    // pop超时，回到循环顶部重查取消信号
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn failure_reason(result: &FetchResult) -> String {
    match result.as_error() {
        Some(error) => error.to_string(),
        None => result.status_kind.to_string(),
    }
}
