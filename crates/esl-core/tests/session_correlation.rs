use std::time::Duration;

use esl_core::client::Client;
use esl_test_utils::MockConfig;

const PASSWORD: &str = "ClueCon";

fn event_plain(headers: &[(&str, &str)]) -> Vec<u8> {
    let mut nested = String::new();
    for (k, v) in headers {
        nested.push_str(k);
        nested.push_str(": ");
        nested.push_str(v);
        nested.push('\n');
    }
    nested.push('\n');
    format!(
        "Content-Type: text/event-plain\nContent-Length: {}\n\n{nested}",
        nested.len()
    )
    .into_bytes()
}

#[tokio::test]
async fn answer_with_matching_tag_binds_sessions_into_a_call() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    let push = server.push_handle();

    push.push(event_plain(&[
        ("Event-Name", "CHANNEL_CREATE"),
        ("Unique-ID", "caller-uuid"),
    ]))
    .await;
    push.push(event_plain(&[
        ("Event-Name", "CHANNEL_CREATE"),
        ("Unique-ID", "callee-uuid"),
    ]))
    .await;
    push.push(event_plain(&[
        ("Event-Name", "CHANNEL_ANSWER"),
        ("Unique-ID", "callee-uuid"),
        ("variable_sip_h_X-originating_session_uuid", "caller-uuid"),
    ]))
    .await;

    tokio::time::sleep(Duration::from_millis(30)).await;

    let callee = client.session("callee-uuid").await.expect("callee session tracked");
    let call_id = callee.call_id.expect("callee bound into a call");
    assert_eq!(call_id, "caller-uuid");

    let call = client
        .listener()
        .call(&call_id)
        .await
        .expect("call exists");
    assert!(call.sessions.contains(&"caller-uuid".to_string()));
    assert!(call.sessions.contains(&"callee-uuid".to_string()));
}

#[tokio::test]
async fn hangup_complete_removes_session_and_tears_down_empty_call() {
    let server = esl_test_utils::MockEslServer::start(MockConfig::new(PASSWORD))
        .await
        .unwrap();
    let client = Client::connect("client-1", server.local_addr(), PASSWORD)
        .await
        .unwrap();
    let push = server.push_handle();

    push.push(event_plain(&[
        ("Event-Name", "CHANNEL_CREATE"),
        ("Unique-ID", "solo-uuid"),
    ]))
    .await;
    push.push(event_plain(&[
        ("Event-Name", "CHANNEL_HANGUP_COMPLETE"),
        ("Unique-ID", "solo-uuid"),
        ("Hangup-Cause", "NORMAL_CLEARING"),
    ]))
    .await;

    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(client.session("solo-uuid").await.is_none());
}
