//! Stateful framer: turns a byte stream into a sequence of [`Message`]s.
//!
//! Per §4.1, a message is a headers block (terminated by a blank line)
//! followed by exactly `Content-Length` body bytes. The [`Framer`] is the
//! only piece of state that survives a partial read — everything else
//! lives in the Connection (§4.2).

use indexmap::IndexMap;

use crate::error::ProtocolError;
use crate::message::{Headers, Message, MessageKind};

/// Accumulates bytes read off the socket and yields complete [`Message`]s.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed newly-read bytes into the framer's internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to pull one complete message out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. On success, the
    /// consumed bytes are dropped from the front of the buffer so the next
    /// call starts fresh.
    pub fn try_parse(&mut self) -> Result<Option<Message>, ProtocolError> {
        let Some(header_end) = find_header_terminator(&self.buf) else {
            return Ok(None);
        };
        let headers = parse_header_block(&self.buf[..header_end])?;

        let content_length = match headers.get("Content-Length") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(v.clone()))?,
            None => 0,
        };

        let body_start = header_end;
        if self.buf.len() < body_start + content_length {
            // Wait for the rest of the body.
            return Ok(None);
        }
        let body_bytes = self.buf[body_start..body_start + content_length].to_vec();
        let total = body_start + content_length;
        self.buf.drain(..total);

        build_message(headers, body_bytes)
    }
}

/// Find the index just past the blank-line header terminator (`\n\n` or
/// `\r\n\r\n`), i.e. where the body begins.
fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_subslice(buf, b"\r\n\r\n") {
        return Some(pos + 4);
    }
    find_subslice(buf, b"\n\n").map(|pos| pos + 2)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_header_block(block: &[u8]) -> Result<Headers, ProtocolError> {
    let text = std::str::from_utf8(block).map_err(|_| ProtocolError::InvalidUtf8)?;
    let mut headers = Headers::new();
    for line in text.split(['\n']).map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(": ")
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| ProtocolError::MalformedHeader(line.to_owned()))?;
        let decoded = crate::percent::percent_decode(value.trim_start())?;
        headers.insert(name.to_owned(), decoded);
    }
    Ok(headers)
}

fn build_message(mut headers: Headers, body: Vec<u8>) -> Result<Message, ProtocolError> {
    let content_type = headers
        .get("Content-Type")
        .ok_or(ProtocolError::MissingContentType)?
        .clone();
    headers.shift_remove("Content-Type");
    headers.shift_remove("Content-Length");

    let body = if body.is_empty() { None } else { Some(body) };

    match content_type.as_str() {
        "auth/request" => Ok(Message {
            kind: MessageKind::AuthRequest,
            headers,
            body,
        }),
        "command/reply" => Ok(Message {
            kind: MessageKind::CommandReply,
            headers,
            body,
        }),
        "api/response" => Ok(Message {
            kind: MessageKind::ApiResponse,
            headers,
            body,
        }),
        "text/disconnect-notice" => Ok(Message {
            kind: MessageKind::DisconnectNotice,
            headers,
            body,
        }),
        "text/event-plain" => build_event_plain(headers, body),
        "text/event-json" => build_event_json(headers, body),
        "text/event-xml" => Ok(Message {
            kind: MessageKind::Event,
            headers,
            body,
        }),
        other => Err(ProtocolError::UnknownContentType(other.to_owned())),
    }
}

/// `text/event-plain` bodies are themselves a nested headers block (plus,
/// rarely, a further body if the nested block carries its own
/// `Content-Length`, e.g. a CDR attachment). The outer headers are
/// discarded in favor of the nested ones, which carry `Event-Name`.
fn build_event_plain(
    _outer: Headers,
    body: Option<Vec<u8>>,
) -> Result<Message, ProtocolError> {
    let body = body.ok_or_else(|| ProtocolError::MalformedEventBody("missing body".into()))?;
    let header_end = find_header_terminator(&body)
        .ok_or_else(|| ProtocolError::MalformedEventBody("no blank-line terminator".into()))?;
    let mut headers = parse_header_block(&body[..header_end])?;

    let nested_len = match headers.get("Content-Length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ProtocolError::InvalidContentLength(v.clone()))?,
        None => 0,
    };
    let nested_body = body[header_end..].to_vec();
    if nested_body.len() < nested_len {
        return Err(ProtocolError::ShortBody {
            expected: nested_len,
            got: nested_body.len(),
        });
    }
    headers.shift_remove("Content-Length");
    let event_body = if nested_body.is_empty() {
        None
    } else {
        Some(nested_body)
    };
    Ok(Message {
        kind: MessageKind::Event,
        headers,
        body: event_body,
    })
}

/// `text/event-json` carries the full event as a JSON object in the body.
/// Flatten it into a header map (values stringified) so downstream code
/// can treat plain and JSON events identically.
fn build_event_json(_outer: Headers, body: Option<Vec<u8>>) -> Result<Message, ProtocolError> {
    let body = body.ok_or_else(|| ProtocolError::MalformedEventBody("missing body".into()))?;
    let text = std::str::from_utf8(&body).map_err(|_| ProtocolError::InvalidUtf8)?;
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedEventBody(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedEventBody("not a JSON object".into()))?;
    let mut headers: IndexMap<String, String> = IndexMap::new();
    for (key, v) in object {
        let as_str = match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        headers.insert(key.clone(), as_str);
    }
    Ok(Message {
        kind: MessageKind::Event,
        headers,
        body: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_reply() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: command/reply\nReply-Text: +OK accepted\n\n");
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::CommandReply);
        assert_eq!(msg.header("Reply-Text"), Some("+OK accepted"));
        assert!(!msg.is_error_reply());
    }

    #[test]
    fn parses_api_response_with_body() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: api/response\nContent-Length: 14\n\nUP 0 years, 1");
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::ApiResponse);
        assert_eq!(msg.body_str(), Some("UP 0 years, 1"));
    }

    #[test]
    fn waits_for_full_body() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: api/response\nContent-Length: 14\n\nUP 0");
        assert!(framer.try_parse().unwrap().is_none());
        framer.feed(b" years, 1");
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.body_str(), Some("UP 0 years, 1"));
    }

    #[test]
    fn waits_for_header_terminator() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: command/reply\nReply-Text: +OK");
        assert!(framer.try_parse().unwrap().is_none());
        framer.feed(b"\n\n");
        assert!(framer.try_parse().unwrap().is_some());
    }

    #[test]
    fn parses_event_plain() {
        let mut framer = Framer::new();
        let body = b"Event-Name: CHANNEL_CREATE\nUnique-ID: abc-123\n\n";
        let outer = format!(
            "Content-Type: text/event-plain\nContent-Length: {}\n\n",
            body.len()
        );
        framer.feed(outer.as_bytes());
        framer.feed(body);
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Event);
        assert_eq!(msg.event_name(), Some("CHANNEL_CREATE"));
        assert_eq!(msg.unique_id(), Some("abc-123"));
    }

    #[test]
    fn parses_event_json() {
        let mut framer = Framer::new();
        let json = r#"{"Event-Name":"BACKGROUND_JOB","Job-UUID":"j-1"}"#;
        let outer = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n",
            json.len()
        );
        framer.feed(outer.as_bytes());
        framer.feed(json.as_bytes());
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.event_name(), Some("BACKGROUND_JOB"));
        assert_eq!(msg.job_uuid(), Some("j-1"));
    }

    #[test]
    fn rejects_unknown_content_type() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: text/bogus\n\n");
        assert!(matches!(
            framer.try_parse(),
            Err(ProtocolError::UnknownContentType(_))
        ));
    }

    #[test]
    fn rejects_missing_content_type() {
        let mut framer = Framer::new();
        framer.feed(b"Reply-Text: +OK\n\n");
        assert!(matches!(
            framer.try_parse(),
            Err(ProtocolError::MissingContentType)
        ));
    }

    #[test]
    fn decodes_percent_encoded_header_values() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: command/reply\nReply-Text: has%3Acolon\n\n");
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.header("Reply-Text"), Some("has:colon"));
    }

    #[test]
    fn accepts_zero_length_body() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: command/reply\nReply-Text: +OK\nContent-Length: 0\n\n");
        let msg = framer.try_parse().unwrap().unwrap();
        assert_eq!(msg.body, None);
    }

    #[test]
    fn two_messages_back_to_back() {
        let mut framer = Framer::new();
        framer.feed(b"Content-Type: command/reply\nReply-Text: +OK\n\n");
        framer.feed(b"Content-Type: command/reply\nReply-Text: +OK2\n\n");
        let first = framer.try_parse().unwrap().unwrap();
        let second = framer.try_parse().unwrap().unwrap();
        assert_eq!(first.header("Reply-Text"), Some("+OK"));
        assert_eq!(second.header("Reply-Text"), Some("+OK2"));
    }
}
