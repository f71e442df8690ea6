//! End-to-end framing scenarios (§8 concrete scenarios 1-4, protocol slice).

use esl_protocol::{Framer, MessageKind};

#[test]
fn auth_request_then_command_reply() {
    let mut framer = Framer::new();
    framer.feed(b"Content-Type: auth/request\n\n");
    let auth = framer.try_parse().unwrap().unwrap();
    assert_eq!(auth.kind, MessageKind::AuthRequest);

    framer.feed(b"Content-Type: command/reply\nReply-Text: +OK accepted\n\n");
    let reply = framer.try_parse().unwrap().unwrap();
    assert_eq!(reply.kind, MessageKind::CommandReply);
    assert!(!reply.is_error_reply());
}

#[test]
fn auth_failure_reply_is_flagged_as_error() {
    let mut framer = Framer::new();
    framer.feed(b"Content-Type: command/reply\nReply-Text: -ERR invalid\n\n");
    let reply = framer.try_parse().unwrap().unwrap();
    assert!(reply.is_error_reply());
}

#[test]
fn synchronous_api_round_trip() {
    let mut framer = Framer::new();
    let body = b"UP 0 years,";
    let frame = format!(
        "Content-Type: api/response\nContent-Length: {}\n\n",
        body.len()
    );
    framer.feed(frame.as_bytes());
    framer.feed(body);
    let reply = framer.try_parse().unwrap().unwrap();
    assert_eq!(reply.kind, MessageKind::ApiResponse);
    assert_eq!(reply.body_str(), Some("UP 0 years,"));
}

#[test]
fn background_job_event_resolves_with_result_body() {
    let mut framer = Framer::new();
    let nested = b"Event-Name: BACKGROUND_JOB\nJob-UUID: aaaa-1111\nContent-Length: 9\n\nbbbb-2222";
    let outer = format!(
        "Content-Type: text/event-plain\nContent-Length: {}\n\n",
        nested.len()
    );
    framer.feed(outer.as_bytes());
    framer.feed(nested);
    let event = framer.try_parse().unwrap().unwrap();
    assert_eq!(event.event_name(), Some("BACKGROUND_JOB"));
    assert_eq!(event.job_uuid(), Some("aaaa-1111"));
    assert_eq!(event.body_str(), Some("bbbb-2222"));
}

#[test]
fn disconnect_notice_is_classified() {
    let mut framer = Framer::new();
    framer.feed(b"Content-Type: text/disconnect-notice\n\n");
    let msg = framer.try_parse().unwrap().unwrap();
    assert_eq!(msg.kind, MessageKind::DisconnectNotice);
}

#[test]
fn reads_interleave_freely_with_command_replies() {
    let mut framer = Framer::new();
    framer.feed(b"Content-Type: text/event-plain\nContent-Length: 43\n\nEvent-Name: CHANNEL_CREATE\nUnique-ID: u-1\n\n");
    framer.feed(b"Content-Type: command/reply\nReply-Text: +OK\n\n");
    let first = framer.try_parse().unwrap().unwrap();
    let second = framer.try_parse().unwrap().unwrap();
    assert_eq!(first.kind, MessageKind::Event);
    assert_eq!(second.kind, MessageKind::CommandReply);
}
