//! Framed, header/body wire protocol for FreeSWITCH's Event Socket Layer.
//!
//! This crate is stateless aside from the [`Framer`]'s partial-read buffer
//! (§4.1): it has no notion of a connection, a pending request, or a
//! session. Everything else in the control plane is built on top of the
//! types here.

pub mod decode;
pub mod encode;
pub mod error;
pub mod message;
pub mod percent;

pub use decode::Framer;
pub use error::ProtocolError;
pub use message::{Headers, Message, MessageKind};
