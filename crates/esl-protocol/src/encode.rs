//! Outbound encoding: request framing and message serialization.
//!
//! Requests are line-oriented and terminated by a blank line; commands that
//! must carry binary-safe payloads (`sendmsg`) declare an explicit
//! `content-length` header instead of relying on line termination.

use crate::message::{Headers, Message, MessageKind};
use crate::percent::percent_encode;

/// `auth <password>\n\n`
pub fn build_auth(password: &str) -> Vec<u8> {
    format!("auth {password}\n\n").into_bytes()
}

/// `api <command>\n\n`
pub fn build_api(command: &str) -> Vec<u8> {
    format!("api {command}\n\n").into_bytes()
}

/// `bgapi <command>\nJob-UUID: <uuid>\n\n`
pub fn build_bgapi(command: &str, job_uuid: &str) -> Vec<u8> {
    format!("bgapi {command}\nJob-UUID: {job_uuid}\n\n").into_bytes()
}

/// `event plain <event-list>\n\n` (or `event json <event-list>`).
pub fn build_event_subscribe(format: &str, events: &[&str]) -> Vec<u8> {
    format!("event {format} {}\n\n", events.join(" ")).into_bytes()
}

/// `filter <header> <value>\n\n`
pub fn build_filter(header: &str, value: &str) -> Vec<u8> {
    format!("filter {header} {value}\n\n").into_bytes()
}

/// `divert_events on\n\n` / `divert_events off\n\n`
pub fn build_divert_events(on: bool) -> Vec<u8> {
    format!("divert_events {}\n\n", if on { "on" } else { "off" }).into_bytes()
}

/// `sendmsg <uuid>\n<headers>\n\n<body>` — the only binary-safe command
/// form; an explicit `content-length` header is always emitted.
pub fn build_sendmsg(uuid: &str, headers: &Headers, body: Option<&[u8]>) -> Vec<u8> {
    let mut out = format!("sendmsg {uuid}\n");
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&percent_encode(value));
        out.push('\n');
    }
    let body = body.unwrap_or(&[]);
    if !body.is_empty() {
        out.push_str(&format!("content-length: {}\n", body.len()));
    }
    out.push('\n');
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// A raw command line, for anything not covered by a dedicated builder
/// above (e.g. `connect`, `myevents`, `linger`, `exit`).
pub fn build_raw(command: &str) -> Vec<u8> {
    format!("{command}\n\n").into_bytes()
}

/// Re-serialize a parsed [`Message`] back to wire bytes.
///
/// Used by the `parse(serialize(msg)) == msg` round-trip property (§8).
/// Event messages are re-wrapped as `text/event-plain` with the header
/// block nested in the body, mirroring how they were originally framed.
pub fn serialize(msg: &Message) -> Vec<u8> {
    match msg.kind {
        MessageKind::Event => serialize_event(msg),
        _ => serialize_flat(content_type_for(msg.kind), &msg.headers, msg.body.as_deref()),
    }
}

fn content_type_for(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::AuthRequest => "auth/request",
        MessageKind::CommandReply => "command/reply",
        MessageKind::ApiResponse => "api/response",
        MessageKind::DisconnectNotice => "text/disconnect-notice",
        MessageKind::Event => unreachable!("handled separately"),
    }
}

fn serialize_flat(content_type: &str, headers: &Headers, body: Option<&[u8]>) -> Vec<u8> {
    let mut out = format!("Content-Type: {content_type}\n");
    for (name, value) in headers {
        if name == "Content-Type" || name == "Content-Length" {
            continue;
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&percent_encode(value));
        out.push('\n');
    }
    if let Some(b) = body {
        out.push_str(&format!("Content-Length: {}\n", b.len()));
    }
    out.push('\n');
    let mut bytes = out.into_bytes();
    if let Some(b) = body {
        bytes.extend_from_slice(b);
    }
    bytes
}

fn serialize_event(msg: &Message) -> Vec<u8> {
    let mut nested = String::new();
    for (name, value) in &msg.headers {
        nested.push_str(name);
        nested.push_str(": ");
        nested.push_str(&percent_encode(value));
        nested.push('\n');
    }
    if let Some(b) = &msg.body {
        nested.push_str(&format!("Content-Length: {}\n", b.len()));
    }
    nested.push('\n');
    let mut nested_bytes = nested.into_bytes();
    if let Some(b) = &msg.body {
        nested_bytes.extend_from_slice(b);
    }

    let mut out = format!(
        "Content-Type: text/event-plain\nContent-Length: {}\n\n",
        nested_bytes.len()
    )
    .into_bytes();
    out.extend_from_slice(&nested_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Framer;

    fn round_trip(msg: Message) {
        let bytes = serialize(&msg);
        let mut framer = Framer::new();
        framer.feed(&bytes);
        let parsed = framer.try_parse().unwrap().unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn round_trips_command_reply() {
        let mut headers = Headers::new();
        headers.insert("Reply-Text".into(), "+OK accepted".into());
        round_trip(Message {
            kind: MessageKind::CommandReply,
            headers,
            body: None,
        });
    }

    #[test]
    fn round_trips_api_response_with_body() {
        let headers = Headers::new();
        round_trip(Message {
            kind: MessageKind::ApiResponse,
            headers,
            body: Some(b"UP 0 years, 1 day".to_vec()),
        });
    }

    #[test]
    fn round_trips_event() {
        let mut headers = Headers::new();
        headers.insert("Event-Name".into(), "CHANNEL_CREATE".into());
        headers.insert("Unique-ID".into(), "abc:123".into());
        round_trip(Message {
            kind: MessageKind::Event,
            headers,
            body: None,
        });
    }

    #[test]
    fn build_api_matches_wire_format() {
        assert_eq!(build_api("status"), b"api status\n\n".to_vec());
    }

    #[test]
    fn build_bgapi_includes_job_uuid() {
        let out = build_bgapi("originate sofia/…", "job-1");
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("bgapi originate"));
        assert!(text.contains("Job-UUID: job-1"));
    }

    #[test]
    fn build_sendmsg_sets_content_length_only_with_body() {
        let headers = Headers::new();
        let no_body = build_sendmsg("uuid-1", &headers, None);
        assert!(!String::from_utf8_lossy(&no_body).contains("content-length"));

        let with_body = build_sendmsg("uuid-1", &headers, Some(b"hello"));
        let text = String::from_utf8_lossy(&with_body);
        assert!(text.contains("content-length: 5"));
        assert!(text.ends_with("hello"));
    }
}
