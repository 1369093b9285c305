#![doc = include_str!("../README.md")]

mod config;
mod deadline;
mod error;
mod pool;
mod queue;
mod result;
mod worker;


pub use crate::config::*;
pub use crate::deadline::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::result::*;
// Re-exported so callers can build tokens without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;
