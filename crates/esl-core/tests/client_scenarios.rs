use std::time::Duration;

use esl_core::client::Client;
use esl_core::error::CoreError;
use esl_test_utils::MockConfig;

const PASSWORD: &str = "ClueCon";

#[tokio::test]
async fn auth_success_connects_client() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn auth_failure_is_surfaced() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD).auth_fails())
        .await
        .unwrap();
    let err = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Auth(_)));
}

#[tokio::test]
async fn synchronous_api_returns_body() {
    let server = esl_test_utils::MockEslServer::start(
        MockConfig::new(PASSWORD).with_api_response("status", "UP 0 years, 1 day"),
    )
    .await
    .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    let body = client.cmd("status").await.unwrap();
    assert_eq!(body, "UP 0 years, 1 day");
}

#[tokio::test]
async fn bgapi_job_resolves_from_background_job_event() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD).with_bgapi_result(
        "originate sofia/external/1000",
        Duration::from_millis(10),
        "+OK bbbb-uuid",
    ))
    .await
    .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    let job = client.bgapi("originate sofia/external/1000").await.unwrap();
    let result = job.wait().await.unwrap();
    assert_eq!(result, "bbbb-uuid");
}

#[tokio::test]
async fn disconnect_notice_fails_pending_jobs() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    let job = client.bgapi("status").await.unwrap();

    server.push_handle().push_disconnect_notice().await;

    let err = job.wait().await.unwrap_err();
    assert!(matches!(err, CoreError::JobFailed(_)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!client.is_connected());
}
