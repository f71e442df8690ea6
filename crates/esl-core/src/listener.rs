use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use esl_protocol::Message;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::model::job::{new_job, JobOutcome, JobResolver};
use crate::model::{Application, AppSpec, Call, Direction, Job, Session};

/// Default subscription set every Listener carries (§6).
pub const DEFAULT_EVENTS: &[&str] = &[
    "CHANNEL_CREATE",
    "CHANNEL_ORIGINATE",
    "CHANNEL_ANSWER",
    "CHANNEL_HANGUP",
    "CHANNEL_HANGUP_COMPLETE",
    "CHANNEL_PARK",
    "CHANNEL_BRIDGE",
    "BACKGROUND_JOB",
    "SERVER_DISCONNECTED",
    "CUSTOM",
];

/// The outcome of the built-in handler chain for one event (§4.4).
enum Dispatch {
    /// Halt: the event is unrelated to anything tracked and is dropped
    /// before application callbacks run.
    NotConsumed,
    /// Continue to application callbacks with this (possibly absent)
    /// Session payload.
    Consumed(Option<Session>),
}

struct State {
    sessions: HashMap<String, Session>,
    calls: HashMap<String, Call>,
    jobs: HashMap<String, JobResolver>,
    apps: Vec<Application>,
    subscription_refcounts: HashMap<String, u32>,
    total_originated_sessions: u64,
}

impl State {
    fn new() -> Self {
        let mut subscription_refcounts = HashMap::new();
        for event in DEFAULT_EVENTS {
            subscription_refcounts.insert((*event).to_owned(), 1);
        }
        State {
            sessions: HashMap::new(),
            calls: HashMap::new(),
            jobs: HashMap::new(),
            apps: Vec::new(),
            subscription_refcounts,
            total_originated_sessions: 0,
        }
    }
}

/// Per-engine observer: owns the Session and Call tables and dispatches
/// to built-in handlers and application callbacks (§4.4).
pub struct Listener {
    state: Mutex<State>,
}

impl Listener {
    pub fn new() -> Arc<Self> {
        Arc::new(Listener {
            state: Mutex::new(State::new()),
        })
    }

    /// Pre-register a Session for an in-flight `originate` before any
    /// event for it has arrived (§4.5 `originate`).
    pub async fn preallocate_session(
        &self,
        uuid: &str,
        direction: Direction,
        client_id: &str,
        app_id: Option<&str>,
    ) {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .entry(uuid.to_owned())
            .or_insert_with(|| Session::new(uuid.to_owned(), direction));
        session.client_id = Some(client_id.to_owned());
        session.app_id = app_id.map(str::to_owned);
    }

    pub async fn register_job(&self, job_uuid: String, session_uuid: Option<String>) -> Job {
        let (job, resolver) = new_job(job_uuid.clone(), session_uuid);
        let mut state = self.state.lock().await;
        state.jobs.insert(job_uuid, resolver);
        job
    }

    pub async fn session(&self, uuid: &str) -> Option<Session> {
        self.state.lock().await.sessions.get(uuid).cloned()
    }

    pub async fn sessions_snapshot(&self) -> Vec<Session> {
        self.state.lock().await.sessions.values().cloned().collect()
    }

    pub async fn call(&self, id: &str) -> Option<Call> {
        self.state.lock().await.calls.get(id).cloned()
    }

    pub async fn active_session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn total_originated_sessions(&self) -> u64 {
        self.state.lock().await.total_originated_sessions
    }

    /// Register every callback and hook in `spec` atomically: on any
    /// failure (duplicate id), nothing is inserted (§7 Atomicity).
    pub async fn load_app(&self, spec: AppSpec) -> Result<String, crate::error::CoreError> {
        let id = spec.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state = self.state.lock().await;
        if state.apps.iter().any(|a| a.id == id) {
            return Err(crate::error::CoreError::Configuration(format!(
                "app id {id:?} already loaded"
            )));
        }
        for event in &spec.extra_subscriptions {
            *state
                .subscription_refcounts
                .entry(event.clone())
                .or_insert(0) += 1;
        }
        let app = Application::from_spec(id.clone(), spec);
        state.apps.push(app);
        Ok(id)
    }

    /// Unload an app, ref-counting its extra subscriptions back down
    /// (§4.4 Filtering).
    pub async fn unload_app(&self, app_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.apps.iter().position(|a| a.id == app_id) {
            let app = state.apps.remove(pos);
            for event in &app.subscriptions {
                if let Some(count) = state.subscription_refcounts.get_mut(event) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    /// Drain every pending job with `ConnectionLost` and mark the loop
    /// stopped (§4.2.4, §4.4 Lifecycle `Stop()`).
    pub async fn on_disconnect(&self) {
        let mut state = self.state.lock().await;
        for (_, resolver) in state.jobs.drain() {
            resolver.resolve(Err("ConnectionLost".to_owned()));
        }
    }

    /// The handler chain entry point, called once per received event by
    /// the EventLoop (§4.3, §4.4).
    pub async fn dispatch(&self, msg: Message) {
        let event_name = msg.event_name().unwrap_or_default().to_owned();
        let dispatch_result = {
            let mut state = self.state.lock().await;
            self.run_builtin(&mut state, &event_name, &msg)
        };
        match dispatch_result {
            Dispatch::NotConsumed => {}
            Dispatch::Consumed(session) => {
                self.run_app_callbacks(&event_name, session.as_ref(), &msg)
                    .await;
            }
        }
    }

    fn run_builtin(&self, state: &mut State, event_name: &str, msg: &Message) -> Dispatch {
        match event_name {
            "CHANNEL_CREATE" => self.on_channel_create(state, msg),
            "CHANNEL_ORIGINATE" => self.on_channel_originate(state, msg),
            "CHANNEL_ANSWER" => self.on_channel_answer(state, msg),
            "CHANNEL_HANGUP" => self.on_channel_hangup(state, msg),
            "CHANNEL_HANGUP_COMPLETE" => self.on_channel_hangup_complete(state, msg),
            "BACKGROUND_JOB" => self.on_background_job(state, msg),
            "CUSTOM" => self.on_custom(state, msg),
            _ => self.on_generic(state, msg),
        }
    }

    fn on_channel_create(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(uuid) = msg.unique_id() else {
            return Dispatch::NotConsumed;
        };
        let session = state
            .sessions
            .entry(uuid.to_owned())
            .or_insert_with(|| Session::new(uuid.to_owned(), Direction::Inbound));
        session.record_event(msg.clone());
        Dispatch::Consumed(Some(session.clone()))
    }

    fn on_channel_originate(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(uuid) = msg.unique_id() else {
            return Dispatch::NotConsumed;
        };
        let session = state
            .sessions
            .entry(uuid.to_owned())
            .or_insert_with(|| Session::new(uuid.to_owned(), Direction::Outbound));
        session.direction = Direction::Outbound;
        session.originated_at = Some(std::time::Instant::now());
        session.state = crate::model::ChannelState::Originated;
        session.record_event(msg.clone());
        state.total_originated_sessions += 1;
        Dispatch::Consumed(Some(session.clone()))
    }

    fn on_channel_answer(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(uuid) = msg.unique_id() else {
            return Dispatch::NotConsumed;
        };
        if !state.sessions.contains_key(uuid) {
            return Dispatch::NotConsumed;
        }
        {
            let session = state.sessions.get_mut(uuid).unwrap();
            session.state = crate::model::ChannelState::Answered;
            session.answered_at = Some(std::time::Instant::now());
            session.record_event(msg.clone());
        }

        // Open question resolved in DESIGN.md: same-engine loopback only.
        if let Some(tag) = msg
            .header("variable_sip_h_X-originating_session_uuid")
            .map(str::to_owned)
        {
            self.bind_call(state, &tag, uuid);
        }

        Dispatch::Consumed(state.sessions.get(uuid).cloned())
    }

    fn bind_call(&self, state: &mut State, call_id: &str, peer_uuid: &str) {
        let call = state
            .calls
            .entry(call_id.to_owned())
            .or_insert_with(|| Call::new(call_id.to_owned()));
        call.add_session(call_id.to_owned());
        call.add_session(peer_uuid.to_owned());

        for uuid in [call_id.to_owned(), peer_uuid.to_owned()] {
            if let Some(session) = state.sessions.get_mut(&uuid) {
                session.call_id = Some(call_id.to_owned());
            }
        }
    }

    fn on_channel_hangup(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(uuid) = msg.unique_id() else {
            return Dispatch::NotConsumed;
        };
        if !state.sessions.contains_key(uuid) {
            return Dispatch::NotConsumed;
        }
        let cause = msg.header("Hangup-Cause").map(str::to_owned);
        let session = state.sessions.get_mut(uuid).unwrap();
        session.state = crate::model::ChannelState::HangingUp;
        session.hangup_cause = cause;
        session.record_event(msg.clone());
        Dispatch::Consumed(state.sessions.get(uuid).cloned())
    }

    fn on_channel_hangup_complete(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(uuid) = msg.unique_id() else {
            return Dispatch::NotConsumed;
        };
        let Some(mut session) = state.sessions.remove(uuid) else {
            return Dispatch::NotConsumed;
        };
        session.state = crate::model::ChannelState::HungUp;
        session.hungup_at = Some(std::time::Instant::now());
        if session.hangup_cause.is_none() {
            session.hangup_cause = msg.header("Hangup-Cause").map(str::to_owned);
        }
        session.record_event(msg.clone());

        if let Some(call_id) = session.call_id.clone() {
            let mut tear_down = false;
            if let Some(call) = state.calls.get_mut(&call_id) {
                call.remove_session(uuid);
                if session.hangup_cause.is_some() && call.hangup_cause.is_none() {
                    call.hangup_cause = session.hangup_cause.clone();
                }
                tear_down = call.is_empty();
            }
            if tear_down {
                state.calls.remove(&call_id);
            }
        }

        Dispatch::Consumed(Some(session))
    }

    fn on_background_job(&self, state: &mut State, msg: &Message) -> Dispatch {
        let Some(job_uuid) = msg.job_uuid() else {
            return Dispatch::NotConsumed;
        };
        if let Some(resolver) = state.jobs.remove(job_uuid) {
            let outcome = parse_job_outcome(msg);
            resolver.resolve(outcome);
        }
        let session = msg
            .unique_id()
            .and_then(|uuid| state.sessions.get(uuid).cloned());
        Dispatch::Consumed(session)
    }

    fn on_custom(&self, state: &mut State, msg: &Message) -> Dispatch {
        let session = msg
            .unique_id()
            .and_then(|uuid| state.sessions.get(uuid).cloned());
        Dispatch::Consumed(session)
    }

    fn on_generic(&self, state: &mut State, msg: &Message) -> Dispatch {
        match msg.unique_id() {
            Some(uuid) => match state.sessions.get(uuid).cloned() {
                Some(session) => Dispatch::Consumed(Some(session)),
                None => Dispatch::NotConsumed,
            },
            None => Dispatch::Consumed(None),
        }
    }

    async fn run_app_callbacks(&self, event_name: &str, session: Option<&Session>, msg: &Message) {
        let apps = self.state.lock().await.apps.clone();
        let custom_key = if event_name == "CUSTOM" {
            crate::model::event::Event::custom_subclass(msg)
                .map(|sub| format!("CUSTOM:{sub}"))
        } else {
            None
        };
        for app in &apps {
            if let Some(pre) = &app.pre_hook {
                invoke_hook(pre, msg);
            }
            if let Some(callbacks) = app.callbacks.get(event_name) {
                for cb in callbacks {
                    invoke_callback(cb, session, msg);
                }
            }
            if let Some(key) = &custom_key {
                if let Some(callbacks) = app.callbacks.get(key) {
                    for cb in callbacks {
                        invoke_callback(cb, session, msg);
                    }
                }
            }
            if let Some(post) = &app.post_hook {
                invoke_hook(post, msg);
            }
        }
    }
}

/// First line of a BACKGROUND_JOB body is `+OK <result>` or `-ERR <cause>`
/// (§4.4 Built-in handlers, §8 scenario 4).
fn parse_job_outcome(msg: &Message) -> JobOutcome {
    let body = msg.body_str().unwrap_or("").trim();
    if let Some(rest) = body.strip_prefix("+OK") {
        Ok(rest.trim().to_owned())
    } else if let Some(rest) = body.strip_prefix("-ERR") {
        Err(rest.trim().to_owned())
    } else {
        Ok(body.to_owned())
    }
}

fn invoke_callback(cb: &crate::model::app::Callback, session: Option<&Session>, msg: &Message) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| cb(session, msg)));
    if result.is_err() {
        warn!(event_name = ?msg.event_name(), headers = ?msg.headers, "application callback panicked; isolated");
    }
}

fn invoke_hook(hook: &crate::model::app::Hook, msg: &Message) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| hook(msg)));
    if result.is_err() {
        warn!(event_name = ?msg.event_name(), "application hook panicked; isolated");
    }
}
