//! Connection, event loop, listener, client, pool and router for a
//! FreeSWITCH ESL control plane, built on [`esl_protocol`].

pub mod client;
pub mod connection;
pub mod error;
pub mod event_loop;
pub mod listener;
pub mod model;
pub mod pool;
pub mod router;

pub use client::{Client, OriginateRequest};
pub use connection::Connection;
pub use error::CoreError;
pub use event_loop::EventLoop;
pub use listener::{Listener, DEFAULT_EVENTS};
pub use pool::Pool;
pub use router::Router;
