// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_session, test_settings};
use crawlcore::domain::models::task::TaskStatus;
use std::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn test_disallowed_paths_are_dropped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/private/page">secret</a><a href="/public">open</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<html><body>open</body></html>"))
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(1));
    session.seed(&[server.uri()]).await.unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.robots_denied, 1);

    let denied = store
        .find_by_url(&format!("{}/private/page", server.uri()))
        .unwrap();
    assert_eq!(denied.status, TaskStatus::Failed);
    assert!(denied
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("Denied by robots.txt"));
    // 被拒绝的URL从未被实际抓取
    assert!(store
        .results()
        .iter()
        .all(|r| !r.url.as_str().contains("/private")));
}

#[tokio::test]
async fn test_robots_failure_fails_open() {
    let server = MockServer::start().await;

    // robots.txt持续5xx，策略降级为全部允许
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>still crawled</body></html>"))
        .mount(&server)
        .await;

    let (session, _store) = test_session(test_settings(1));
    session.seed(&[server.uri()]).await.unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.robots_denied, 0);
}

#[tokio::test]
async fn test_crawl_delay_spaces_same_host_fetches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a><a href="/b">b</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<html><body>a</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<html><body>b</body></html>"))
        .mount(&server)
        .await;

    let (session, _store) = test_session(test_settings(2));
    session.seed(&[server.uri()]).await.unwrap();

    let started = Instant::now();
    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    // 同主机三次抓取的开始间隔不小于crawl-delay
    assert!(started.elapsed().as_secs_f64() >= 2.0);
}
