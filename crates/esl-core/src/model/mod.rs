pub mod app;
pub mod call;
pub mod event;
pub mod job;
pub mod session;

pub use app::{Application, AppSpec, Callback, Hook};
pub use call::Call;
pub use event::Event;
pub use job::Job;
pub use session::{ChannelState, Direction, Session};
