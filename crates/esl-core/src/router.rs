use std::sync::Arc;

use esl_protocol::Message;
use regex::{Captures, Regex};

use crate::model::Session;

/// Returned by a route callback: `true` stops evaluation of further routes
/// for this event (§4.6: "stop sentinel").
pub type RouteCallback =
    Arc<dyn for<'a> Fn(Option<&Session>, &Captures<'a>, &Message) -> bool + Send + Sync>;

/// One guarded, pattern-matched route (§4.6).
struct Route {
    /// All of these `(header, regex)` pairs must match before the pattern
    /// is even tried.
    guards: Vec<(String, Regex)>,
    /// The field the pattern is evaluated against, and the pattern itself.
    pattern_field: String,
    pattern: Regex,
    callback: RouteCallback,
}

/// The public, app-facing dispatcher (§4.6): maps `(header, regex)` guards
/// to callbacks with first-match-wins, stop-sentinel semantics.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Router { routes: Vec::new() }
    }

    /// Register a route. `guards` must all match a header before
    /// `pattern_field`/`pattern` is tried; on match `callback` runs with
    /// the capture groups.
    pub fn add_route(
        &mut self,
        guards: Vec<(impl Into<String>, Regex)>,
        pattern_field: impl Into<String>,
        pattern: Regex,
        callback: RouteCallback,
    ) {
        self.routes.push(Route {
            guards: guards.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            pattern_field: pattern_field.into(),
            pattern,
            callback,
        });
    }

    /// Evaluate every route against `msg` in registration order, stopping
    /// as soon as a matched callback returns `true`.
    pub fn dispatch(&self, session: Option<&Session>, msg: &Message) {
        for route in &self.routes {
            let guards_pass = route
                .guards
                .iter()
                .all(|(header, re)| msg.header(header).is_some_and(|v| re.is_match(v)));
            if !guards_pass {
                continue;
            }
            let Some(field_value) = msg.header(&route.pattern_field) else {
                continue;
            };
            let Some(captures) = route.pattern.captures(field_value) else {
                continue;
            };
            if (route.callback)(session, &captures, msg) {
                break;
            }
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
