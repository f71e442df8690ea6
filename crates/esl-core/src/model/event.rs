use esl_protocol::Message;

/// A thin classification layer over a parsed [`Message`] of
/// `kind = Event` (§3 Data Model: Event subclasses).
pub struct Event;

impl Event {
    pub fn is_channel_event(msg: &Message) -> bool {
        msg.unique_id().is_some()
    }

    pub fn is_background_job(msg: &Message) -> bool {
        msg.event_name() == Some("BACKGROUND_JOB")
    }

    pub fn is_custom(msg: &Message) -> bool {
        msg.event_name() == Some("CUSTOM")
    }

    pub fn custom_subclass(msg: &Message) -> Option<&str> {
        msg.header("Event-Subclass")
    }
}
