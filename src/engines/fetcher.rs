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

use crate::config::settings::FetchSettings;
use crate::domain::models::fetch_result::{FetchResult, StatusKind};
use crate::domain::models::host_state::HostRegistry;
use crate::domain::models::task::CrawlTask;
use crate::engines::traits::{HttpTransport, TransportRequest, TransportResponse};
use crate::engines::user_agent::UserAgentProvider;
use crate::utils::url_utils;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

/// 单次跟随重定向链的结果
enum FetchOutcome {
    /// 收到最终响应
    Response(TransportResponse),
    /// 传输层失败
    Network(String),
    /// 跳数超限
    TooManyRedirects,
    /// 重定向缺少可用的Location
    DanglingRedirect(u16),
}

/// 抓取器
///
/// 对单个任务执行一次抓取尝试：手动跟随重定向到配置的跳数
/// 上限，把响应归入结果分类。重试由调用方通过Frontier驱动，
/// 本层不做退避等待。任务对应的主机槽位在出队时已被占用，
/// 无论结果如何，抓取完成时释放槽位并刷新last_fetch_time。
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    hosts: Arc<HostRegistry>,
    user_agents: UserAgentProvider,
    timeout: Duration,
    redirect_limit: u32,
}

impl Fetcher {
    /// 创建新的抓取器实例
    ///
    /// # 参数
    ///
    /// * `transport` - HTTP传输实现
    /// * `hosts` - 主机状态注册表，与Frontier共享
    /// * `user_agents` - User-Agent提供者
    /// * `settings` - 抓取配置
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        hosts: Arc<HostRegistry>,
        user_agents: UserAgentProvider,
        settings: &FetchSettings,
    ) -> Self {
        Self {
            transport,
            hosts,
            user_agents,
            timeout: settings.timeout(),
            redirect_limit: settings.redirect_limit,
        }
    }

    /// 执行一次抓取尝试
    ///
    /// # 参数
    ///
    /// * `task` - 待抓取的任务
    ///
    /// # 返回值
    ///
    /// 分类后的抓取结果；原始传输错误不向上传播
    pub async fn fetch(&self, task: &CrawlTask) -> FetchResult {
        let started = Instant::now();
        let outcome = self.follow_redirects(task.url.as_url()).await;

        // Release the host slot and stamp the fetch time whatever the outcome
        self.hosts.release(task.url.host(), true);

        let response_time_ms = started.elapsed().as_millis() as u64;
        self.into_result(task, outcome, response_time_ms)
    }

    /// 手动跟随重定向链，直到最终响应或跳数超限
    async fn follow_redirects(&self, start: &Url) -> FetchOutcome {
        let mut current = start.clone();

        for hop in 0..=self.redirect_limit {
            let request = TransportRequest {
                url: current.clone(),
                user_agent: self.user_agents.next(),
                headers: vec![
                    (
                        "Accept".to_string(),
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                            .to_string(),
                    ),
                    ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                ],
                timeout: self.timeout,
            };

            let response = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) => return FetchOutcome::Network(e.to_string()),
            };

            if (300..400).contains(&response.status) {
                let next = response
                    .location()
                    .and_then(|loc| url_utils::resolve_url(&current, loc).ok())
                    .filter(|next| matches!(next.scheme(), "http" | "https"));
                match next {
                    Some(next) => {
                        trace!("Redirect hop {}: {} -> {}", hop + 1, current, next);
                        current = next;
                        continue;
                    }
                    None => return FetchOutcome::DanglingRedirect(response.status),
                }
            }

            return FetchOutcome::Response(response);
        }

        FetchOutcome::TooManyRedirects
    }

    fn into_result(&self, task: &CrawlTask, outcome: FetchOutcome, response_time_ms: u64) -> FetchResult {
        match outcome {
            FetchOutcome::Response(response) => {
                let status_kind = StatusKind::from_status(response.status);
                let content_type = response.content_type().map(|ct| ct.to_string());
                let is_html = content_type
                    .as_deref()
                    .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
                    .unwrap_or(false);
                // 响应体只在HTML成功响应时保留，二进制内容交由
                // 解码协作方处理
                let body = if status_kind == StatusKind::Success && is_html {
                    Some(response.text_lossy())
                } else {
                    None
                };
                debug!(
                    "Fetched {} status {} ({} ms)",
                    task.url, response.status, response_time_ms
                );
                FetchResult {
                    url: task.url.clone(),
                    status_kind,
                    status_code: Some(response.status),
                    body,
                    content_type,
                    headers: response.headers,
                    fetched_at: Utc::now(),
                    detail: None,
                    response_time_ms,
                }
            }
            FetchOutcome::Network(message) => {
                debug!("Fetch failed for {}: {}", task.url, message);
                FetchResult {
                    url: task.url.clone(),
                    status_kind: StatusKind::NetworkError,
                    status_code: None,
                    body: None,
                    content_type: None,
                    headers: HashMap::new(),
                    fetched_at: Utc::now(),
                    detail: Some(message),
                    response_time_ms,
                }
            }
            FetchOutcome::TooManyRedirects => {
                debug!(
                    "Redirect limit ({}) exceeded for {}",
                    self.redirect_limit, task.url
                );
                FetchResult {
                    url: task.url.clone(),
                    status_kind: StatusKind::ClientError,
                    status_code: None,
                    body: None,
                    content_type: None,
                    headers: HashMap::new(),
                    fetched_at: Utc::now(),
                    detail: Some("too many redirects".to_string()),
                    response_time_ms,
                }
            }
            FetchOutcome::DanglingRedirect(status) => FetchResult {
                url: task.url.clone(),
                status_kind: StatusKind::Redirect,
                status_code: Some(status),
                body: None,
                content_type: None,
                headers: HashMap::new(),
                fetched_at: Utc::now(),
                detail: Some("redirect without usable location".to_string()),
                response_time_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::traits::TransportError;
    use crate::utils::url_utils::normalize;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::time::Instant as TokioInstant;

    struct ScriptedTransport {
        // url -> (status, headers, body)
        routes: Mutex<HashMap<String, (u16, Vec<(String, String)>, &'static str)>>,
        fail_all: bool,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                fail_all: false,
            }
        }

        fn failing() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                fail_all: true,
            }
        }

        fn route(self, url: &str, status: u16, headers: &[(&str, &str)], body: &'static str) -> Self {
            self.routes.lock().insert(
                url.to_string(),
                (
                    status,
                    headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body,
                ),
            );
            self
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(
            &self,
            request: &TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            if self.fail_all {
                return Err(TransportError::Connect("connection refused".into()));
            }
            let routes = self.routes.lock();
            let Some((status, headers, body)) = routes.get(request.url.as_str()) else {
                return Ok(TransportResponse {
                    status: 404,
                    headers: HashMap::new(),
                    body: Bytes::new(),
                });
            };
            Ok(TransportResponse {
                status: *status,
                headers: headers.iter().cloned().collect(),
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    fn fetcher(transport: ScriptedTransport) -> (Fetcher, Arc<HostRegistry>) {
        let hosts = Arc::new(HostRegistry::new(2, Duration::ZERO));
        let settings = FetchSettings {
            timeout_secs: 30,
            redirect_limit: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        };
        let fetcher = Fetcher::new(
            Arc::new(transport),
            hosts.clone(),
            UserAgentProvider::new("crawlcore-bot/1.0".into(), false),
            &settings,
        );
        (fetcher, hosts)
    }

    fn task(url: &str) -> CrawlTask {
        CrawlTask::discovered(normalize(url, false).unwrap(), 0, 3)
    }

    fn acquire_slot(hosts: &HostRegistry, host: &str) {
        assert!(hosts.host(host).try_acquire(TokioInstant::now(), 2));
    }

    #[tokio::test]
    async fn test_successful_html_fetch() {
        let transport = ScriptedTransport::new().route(
            "http://example.com/a",
            200,
            &[("content-type", "text/html; charset=utf-8")],
            "<html><body>hello</body></html>",
        );
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/a")).await;
        assert_eq!(result.status_kind, StatusKind::Success);
        assert_eq!(result.status_code, Some(200));
        assert!(result.body.as_deref().unwrap().contains("hello"));
        // 槽位在抓取完成时释放
        assert_eq!(hosts.host("example.com").in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_html_body_is_dropped() {
        let transport = ScriptedTransport::new().route(
            "http://example.com/logo",
            200,
            &[("content-type", "image/png")],
            "not really a png",
        );
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/logo")).await;
        assert_eq!(result.status_kind, StatusKind::Success);
        assert!(result.body.is_none());
        assert_eq!(result.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let transport =
            ScriptedTransport::new().route("http://example.com/gone", 404, &[], "not found");
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/gone")).await;
        assert_eq!(result.status_kind, StatusKind::ClientError);
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_redirect_chain_is_followed() {
        let transport = ScriptedTransport::new()
            .route("http://example.com/a", 301, &[("location", "/b")], "")
            .route("http://example.com/b", 302, &[("location", "http://example.com/c")], "")
            .route(
                "http://example.com/c",
                200,
                &[("content-type", "text/html")],
                "<html>done</html>",
            );
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/a")).await;
        assert_eq!(result.status_kind, StatusKind::Success);
        assert!(result.body.as_deref().unwrap().contains("done"));
    }

    #[tokio::test]
    async fn test_redirect_limit_exceeded() {
        // /loop 永远重定向到自身
        let transport = ScriptedTransport::new().route(
            "http://example.com/loop",
            301,
            &[("location", "/loop")],
            "",
        );
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/loop")).await;
        assert_eq!(result.status_kind, StatusKind::ClientError);
        assert_eq!(result.detail.as_deref(), Some("too many redirects"));
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_redirect_without_location() {
        let transport = ScriptedTransport::new().route("http://example.com/r", 301, &[], "");
        let (fetcher, hosts) = fetcher(transport);
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/r")).await;
        assert_eq!(result.status_kind, StatusKind::Redirect);
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_network_error_is_retryable() {
        let (fetcher, hosts) = fetcher(ScriptedTransport::failing());
        acquire_slot(&hosts, "example.com");

        let result = fetcher.fetch(&task("http://example.com/a")).await;
        assert_eq!(result.status_kind, StatusKind::NetworkError);
        assert!(result.is_retryable());
        assert_eq!(hosts.host("example.com").in_flight(), 0);
    }
}
