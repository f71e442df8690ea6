use std::collections::HashMap;
use std::sync::Arc;

use esl_protocol::Message;

use super::session::Session;

/// A registered event callback. Invoked with the Session the built-in
/// handler chain resolved for this event (`None` for session-less events
/// such as `BACKGROUND_JOB`) and the raw Message.
///
/// Callbacks are synchronous: an application that needs to await should
/// spawn its own task from inside the callback (§5: "any explicit `await
/// event X on session Y` in an application coroutine" is modeled this way
/// rather than by making the callback itself `async`, keeping the handler
/// chain's isolation guarantee — §7 — simple to enforce with
/// `catch_unwind`).
pub type Callback = Arc<dyn Fn(Option<&Session>, &Message) + Send + Sync>;

/// A pre- or post-dispatch hook, run once per event regardless of
/// event-name routing.
pub type Hook = Arc<dyn Fn(&Message) + Send + Sync>;

/// What a caller presents to `Client::load_app` / `Listener::load_app`
/// (§9: "Decorator-based callback registration becomes an explicit
/// registration API").
#[derive(Clone, Default)]
pub struct AppSpec {
    pub id: Option<String>,
    pub callbacks: Vec<(String, Callback)>,
    pub pre_hook: Option<Hook>,
    pub post_hook: Option<Hook>,
    /// Event names this app needs beyond the Listener's default
    /// subscription set (§4.4 Filtering).
    pub extra_subscriptions: Vec<String>,
}

impl AppSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn on(mut self, event_name: impl Into<String>, callback: Callback) -> Self {
        self.callbacks.push((event_name.into(), callback));
        self
    }

    pub fn subscribing_to(mut self, event_name: impl Into<String>) -> Self {
        self.extra_subscriptions.push(event_name.into());
        self
    }
}

/// A loaded Application: an id and its callback table (§3 Data Model:
/// Application).
#[derive(Clone)]
pub struct Application {
    pub id: String,
    pub callbacks: HashMap<String, Vec<Callback>>,
    pub pre_hook: Option<Hook>,
    pub post_hook: Option<Hook>,
    pub subscriptions: Vec<String>,
}

impl Application {
    pub fn from_spec(id: String, spec: AppSpec) -> Self {
        let mut callbacks: HashMap<String, Vec<Callback>> = HashMap::new();
        for (event_name, cb) in spec.callbacks {
            callbacks.entry(event_name).or_default().push(cb);
        }
        Application {
            id,
            callbacks,
            pre_hook: spec.pre_hook,
            post_hook: spec.post_hook,
            subscriptions: spec.extra_subscriptions,
        }
    }
}
