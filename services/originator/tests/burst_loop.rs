use std::sync::Arc;
use std::time::Duration;

use esl_core::client::OriginateRequest;
use esl_core::pool::Pool;
use esl_test_utils::MockConfig;
use originator::cdr::CdrStore;
use originator::{Originator, OriginatorState, Params};

const PASSWORD: &str = "ClueCon";

#[tokio::test]
async fn stops_after_max_offered_is_reached() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();

    let pool = Arc::new(Pool::connect(&[server.local_addr()], PASSWORD).await.unwrap());
    let request = OriginateRequest::new("sofia/default/9196", "park");
    let params = Params {
        rate: 5,
        limit: 5,
        max_offered: 3,
        duration: Duration::from_secs(1),
        period: Duration::from_millis(50),
        autohangup: false,
    };
    let cdr = Arc::new(CdrStore::new());
    let originator = Originator::new(pool, "test-app".to_owned(), request, params, cdr);

    originator.start().await.unwrap();

    for _ in 0..50 {
        if originator.state().await == OriginatorState::Stopped {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(originator.state().await, OriginatorState::Stopped);
    assert_eq!(originator.total_offered(), 3);
}

#[tokio::test]
async fn double_start_is_idempotent() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();
    let pool = Arc::new(Pool::connect(&[server.local_addr()], PASSWORD).await.unwrap());
    let request = OriginateRequest::new("sofia/default/9196", "park");
    let params = Params {
        rate: 0,
        limit: 0,
        max_offered: 0,
        duration: Duration::from_secs(1),
        period: Duration::from_millis(50),
        autohangup: false,
    };
    let cdr = Arc::new(CdrStore::new());
    let originator = Originator::new(pool, "test-app".to_owned(), request, params, cdr);

    originator.start().await.unwrap();
    originator.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(originator.total_offered(), 0);
}
