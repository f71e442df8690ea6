use std::collections::VecDeque;
use std::time::Instant;

use esl_protocol::Message;

/// Bound on the rolling event history kept per session (§3: "rolling event
/// history"). Old entries are dropped once the bound is hit; `Session::get`
/// only ever needs the most recent occurrence of a header.
const HISTORY_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Originated,
    Answered,
    HangingUp,
    HungUp,
}

/// One FreeSWITCH channel (§3 Data Model: Session).
#[derive(Debug, Clone)]
pub struct Session {
    pub uuid: String,
    pub direction: Direction,
    pub state: ChannelState,
    pub created_at: Instant,
    pub originated_at: Option<Instant>,
    pub answered_at: Option<Instant>,
    pub hungup_at: Option<Instant>,
    pub hangup_cause: Option<String>,
    /// The Call this session is bound into, if any (§9: non-owning
    /// back-reference — the Call owns the session list, sessions only
    /// carry the id to look it up).
    pub call_id: Option<String>,
    /// The Application that loaded the `&app()` this session was
    /// originated with, if any.
    pub app_id: Option<String>,
    /// The Client that owns this session, via `sip_h_X-switchio_client`.
    pub client_id: Option<String>,
    /// Set by an application that wants to control its own teardown
    /// instead of the Originator's autohangup timer (§4.7 Autohangup).
    pub owns_teardown: bool,
    history: VecDeque<Message>,
}

impl Session {
    pub fn new(uuid: String, direction: Direction) -> Self {
        Session {
            uuid,
            direction,
            state: ChannelState::Created,
            created_at: Instant::now(),
            originated_at: None,
            answered_at: None,
            hungup_at: None,
            hangup_cause: None,
            call_id: None,
            app_id: None,
            client_id: None,
            owns_teardown: false,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn record_event(&mut self, msg: Message) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(msg);
    }

    /// Look up a channel variable or standard header by name over the
    /// rolling event history, most recent event first (§9: "Dynamic
    /// attribute access on sessions"). `variable_` is the conventional
    /// prefix for FreeSWITCH channel variables; bare names address
    /// standard event headers.
    pub fn get(&self, name: &str) -> Option<&str> {
        for event in self.history.iter().rev() {
            if let Some(v) = event.header(name) {
                return Some(v);
            }
            let prefixed = format!("variable_{name}");
            if let Some(v) = event.header(&prefixed) {
                return Some(v);
            }
        }
        None
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state, ChannelState::HungUp)
    }
}
