use indexmap::IndexMap;

/// Header block, order-preserving (engines sometimes repeat a header name;
/// the last value wins on insert but insertion order is kept for
/// round-trip fidelity of outbound messages we construct ourselves).
pub type Headers = IndexMap<String, String>;

/// Classification of a parsed [`Message`], derived from `Content-Type`
/// (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `auth/request` — the engine wants the client to authenticate.
    AuthRequest,
    /// `command/reply` — direct response to a command.
    CommandReply,
    /// `api/response` — response body to a synchronous `api` call.
    ApiResponse,
    /// `text/event-plain`, `text/event-json`, `text/event-xml` — an
    /// asynchronous event.
    Event,
    /// `text/disconnect-notice` — the engine is closing the socket.
    DisconnectNotice,
}

/// One parsed ESL wire unit (§3 Data Model: Message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// `Reply-Text` starting with `-ERR` marks a failed `command/reply` or
    /// `api/response` (§4.5 `api`).
    pub fn is_error_reply(&self) -> bool {
        self.header("Reply-Text")
            .map(|t| t.starts_with("-ERR"))
            .unwrap_or_else(|| {
                self.body_str()
                    .map(|b| b.starts_with("-ERR"))
                    .unwrap_or(false)
            })
    }

    pub fn event_name(&self) -> Option<&str> {
        self.header("Event-Name")
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.header("Unique-ID")
    }

    pub fn job_uuid(&self) -> Option<&str> {
        self.header("Job-UUID")
    }
}
