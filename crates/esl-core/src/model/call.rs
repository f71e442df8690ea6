/// 1-2 correlated Sessions forming one user call (§3 Data Model: Call).
///
/// The Call owns the session-id list; Sessions only carry `call_id` back to
/// here, so there is no reference cycle to break (§9: Cyclic structures).
#[derive(Debug, Clone)]
pub struct Call {
    pub id: String,
    pub sessions: Vec<String>,
    pub hangup_cause: Option<String>,
}

impl Call {
    pub fn new(id: String) -> Self {
        Call {
            id,
            sessions: Vec::with_capacity(2),
            hangup_cause: None,
        }
    }

    pub fn add_session(&mut self, session_uuid: String) {
        if !self.sessions.contains(&session_uuid) {
            self.sessions.push(session_uuid);
        }
    }

    pub fn remove_session(&mut self, session_uuid: &str) {
        self.sessions.retain(|s| s != session_uuid);
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
