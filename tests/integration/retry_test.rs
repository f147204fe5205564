// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{test_session, test_settings};
use crawlcore::domain::models::task::TaskStatus;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;

    // 前三次返回503，之后恢复
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>recovered</body></html>"),
        )
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(1));
    session
        .seed(&[format!("{}/flaky", server.uri())])
        .await
        .unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_failed, 0);
    assert_eq!(report.retries, 3);

    let task = store
        .find_by_url(&format!("{}/flaky", server.uri()))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.attempt_count, 3);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (session, store) = test_session(test_settings(1));
    session
        .seed(&[format!("{}/broken", server.uri())])
        .await
        .unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.retries, 3);

    let task = store
        .find_by_url(&format!("{}/broken", server.uri()))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    // 初次尝试加三次重试全部耗尽
    assert_eq!(task.attempt_count, 3);
    assert!(task.failure_reason.is_some());
}

#[tokio::test]
async fn test_connection_failure_is_retried_then_terminal() {
    // 无监听端口，连接被拒绝
    let (session, store) = test_session(test_settings(1));
    session
        .seed(&["http://127.0.0.1:9/unreachable".to_string()])
        .await
        .unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.pages_failed, 1);

    let task = store
        .find_by_url("http://127.0.0.1:9/unreachable")
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempt_count, 3);
}
