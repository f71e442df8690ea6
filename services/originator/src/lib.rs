pub mod burst;
pub mod cdr;
pub mod config;

pub use burst::{Originator, OriginatorError, OriginatorState, Params};
pub use cdr::CdrStore;
