// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_session, test_settings};
use crawlcore::domain::models::task::{CrawlTask, TaskStatus};
use crawlcore::domain::repositories::task_store::TaskStore;
use crawlcore::utils::url_utils::normalize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn test_crawl_follows_links_and_deduplicates() {
    let server = MockServer::start().await;

    // 未匹配的请求（包括robots.txt）由wiremock返回404，等价于没有robots.txt
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body>
                <a href="/a">a</a>
                <a href="/b">b</a>
                <a href="/a#dup">a again</a>
                <a href="http://elsewhere.invalid/x">foreign</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/">back</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<html><body>leaf</body></html>"))
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(2));
    assert_eq!(session.seed(&[server.uri()]).await.unwrap(), 1);

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(store.count_with_status(TaskStatus::Succeeded), 3);
    // 站外链接被same_domain_only过滤，从未入队
    assert!(store.find_by_url("http://elsewhere.invalid/x").is_none());
}

#[tokio::test]
async fn test_404_fails_terminally_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/missing">gone</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(1));
    session.seed(&[server.uri()]).await.unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.retries, 0);

    let failed = store
        .find_by_url(&format!("{}/missing", server.uri()))
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    // 4xx不重试，只有一次抓取尝试
    assert_eq!(failed.attempt_count, 0);
    let attempts = store
        .results()
        .iter()
        .filter(|r| r.url.as_str().ends_with("/missing"))
        .count();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn test_depth_limit_stops_expansion() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/b">b</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("never fetched"))
        .mount(&server)
        .await;

    let mut settings = test_settings(1);
    settings.crawler.max_depth = 1;
    let (session, store) = test_session(settings);
    session.seed(&[server.uri()]).await.unwrap();

    let report = session.run().await.unwrap();

    // 深度0与1被抓取，深度2的链接不再入队
    assert_eq!(report.pages_fetched, 2);
    assert!(store.find_by_url(&format!("{}/b", server.uri())).is_none());
}

#[tokio::test]
async fn test_resume_requeues_pending_tasks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/left-over"))
        .respond_with(html("<html><body>resumed</body></html>"))
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(1));

    // 模拟上次会话留下的未完成任务
    let url = normalize(&format!("{}/left-over", server.uri()), false).unwrap();
    let mut pending = CrawlTask::discovered(url, 0, 3);
    pending.enqueue().unwrap();
    store.save(&pending).await.unwrap();

    assert_eq!(session.resume().await.unwrap(), 1);
    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    let resumed = store
        .find_by_url(&format!("{}/left-over", server.uri()))
        .unwrap();
    assert_eq!(resumed.status, TaskStatus::Succeeded);
}
